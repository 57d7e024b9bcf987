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

//! Remote command execution with cooperative cancellation.

use tokio_util::sync::CancellationToken;

use super::error::{Cancelled, Error};
use super::transport::Transport;

/// Run `command` on the remote host and return its non-empty stdout lines.
///
/// The remote process races the cancellation token. If the token fires
/// first, SIGINT is sent to the remote process and [`Error::Canceled`] is
/// returned; a late result from the process is discarded.
pub(crate) async fn run_command(
    transport: &dyn Transport,
    cancel: &CancellationToken,
    command: &str,
) -> Result<Vec<String>, Error> {
    tracing::debug!("run ssh command {:?} on {}", command, transport.remote_addr());

    let spawned = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Canceled(Cancelled)),
        spawned = transport.spawn(command) => spawned,
    };
    let mut process = spawned.map_err(|source| Error::RemoteCommandFailed {
        command: command.to_string(),
        source,
    })?;

    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = process.wait() => Some(res),
    };

    let output = match finished {
        Some(res) => res.map_err(|source| Error::RemoteCommandFailed {
            command: command.to_string(),
            source,
        })?,
        None => {
            tracing::debug!("canceled, interrupting remote command {:?}", command);
            process
                .interrupt()
                .await
                .map_err(|source| Error::SignalFailed { source })?;
            return Err(Error::Canceled(Cancelled));
        }
    };

    let lines = split_lines(&output.stdout);
    for line in &lines {
        tracing::debug!(target: "sshsync::remote::output", "{}", line);
    }

    if output.exit_status != 0 {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() {
            tracing::debug!("remote stderr for {:?}: {}", command, stderr.trim_end());
        }
        return Err(Error::RemoteCommandFailed {
            command: command.to_string(),
            source: crate::ssh::tokio_client::Error::ExitStatus {
                status: output.exit_status,
                stderr,
            },
        });
    }

    Ok(lines)
}

/// Split command output on newlines, dropping empty lines.
fn split_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
