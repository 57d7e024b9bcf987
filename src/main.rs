// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use sshsync::{
    cli::{Cli, Commands},
    remote::{Executor, ExecutorConfig, ServerCheckMethod},
    utils::init_logging,
};

/// Format a Duration into a human-readable string
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs_f64();

    if total_seconds < 1.0 {
        format!("{:.1} ms", total_seconds * 1000.0)
    } else if total_seconds < 60.0 {
        format!("{total_seconds:.2} s")
    } else {
        let minutes = duration.as_secs() / 60;
        let seconds = duration.as_secs() % 60;
        format!("{minutes}m {seconds}s")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let passphrase = cli.key_passphrase.clone().map(Zeroizing::new);
    let server_check = match &cli.known_hosts {
        Some(path) => ServerCheckMethod::with_known_hosts_file(&path.to_string_lossy()),
        None => ServerCheckMethod::NoCheck,
    };
    let config = ExecutorConfig {
        connect_timeout: Duration::from_secs(cli.connect_timeout),
        server_check,
        ..ExecutorConfig::default()
    };

    let mut executor = Executor::with_config(&cli.user, &cli.identity, passphrase.as_ref(), config)
        .with_context(|| format!("Failed to load SSH key from {:?}", cli.identity))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, canceling");
                cancel.cancel();
            }
        });
    }

    executor
        .connect(&cancel, &cli.host)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.host))?;

    let result = run_command(&executor, &cancel, &cli).await;

    if let Err(e) = executor.close().await {
        tracing::warn!("{e}");
    }

    result
}

async fn run_command(executor: &Executor, cancel: &CancellationToken, cli: &Cli) -> Result<()> {
    let started = Instant::now();

    match &cli.command {
        Commands::Run { .. } => {
            let command = cli.get_command();
            let lines = executor.run(cancel, &command).await?;
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Upload {
            source,
            destination,
            mkdir,
        } => {
            executor.upload(cancel, source, destination, *mkdir).await?;
            tracing::info!(
                "uploaded {} in {}",
                source.display(),
                format_duration(started.elapsed())
            );
        }
        Commands::Download {
            source,
            destination,
            mkdir,
        } => {
            executor
                .download(cancel, source, destination, *mkdir)
                .await?;
            tracing::info!(
                "downloaded {} in {}",
                source,
                format_duration(started.elapsed())
            );
        }
        Commands::Sync {
            local_dir,
            remote_dir,
        } => {
            let synced = executor.sync(cancel, local_dir, remote_dir).await?;
            for path in &synced {
                println!("{path}");
            }
            tracing::info!(
                "synced {} file(s) in {}",
                synced.len(),
                format_duration(started.elapsed())
            );
        }
    }

    Ok(())
}
