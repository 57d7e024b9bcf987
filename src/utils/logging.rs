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

use tracing_subscriber::EnvFilter;

/// Create an environment filter based on verbosity level
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG wins so russh internals can be traced on demand
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("sshsync=warn"),
            1 => EnvFilter::new("sshsync=info"),
            // -vv: include russh debug logs for SSH troubleshooting
            2 => EnvFilter::new("sshsync=debug,russh=debug"),
            _ => EnvFilter::new("sshsync=trace,russh=trace"),
        }
    }
}

/// Initialize console logging on stderr.
///
/// Stdout is left to command output and synced paths.
pub fn init_logging(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
