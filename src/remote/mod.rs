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

//! Remote command execution and file synchronization against one host.
//!
//! An [`Executor`] owns at most one live session. Every operation takes a
//! [`CancellationToken`]; operations on one executor are expected to run one
//! at a time.

mod error;
mod inventory;
mod reconcile;
mod runner;
mod transfer;
pub mod transport;

use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

pub use crate::ssh::tokio_client::Error as TransportError;
pub use crate::ssh::tokio_client::ServerCheckMethod;
pub use error::{Cancelled, Error};
pub use inventory::{local_inventory, FileProperties, Inventory};
pub use reconcile::{find_unmatched, MOD_TIME_TOLERANCE};
pub use transport::{Connector, ProcessOutput, RemoteProcess, Transport};

use crate::ssh::SshConnector;

/// Default SSH port appended to hosts given without one.
pub const DEFAULT_PORT: u16 = 22;

/// Default limit for dial plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for an [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Port used when the host has none.
    pub default_port: u16,
    /// Limit for establishing a session. Expiry is reported as
    /// [`Error::DialFailed`].
    pub connect_timeout: Duration,
    /// Host key policy.
    pub server_check: ServerCheckMethod,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            server_check: ServerCheckMethod::default(),
        }
    }
}

struct Session {
    host: String,
    transport: Box<dyn Transport>,
}

/// Runs commands and moves files on a single remote host.
pub struct Executor {
    connector: Box<dyn Connector>,
    config: ExecutorConfig,
    session: Option<Session>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("host", &self.host())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Create an executor for `user`, reading the private key at `key_path`.
    ///
    /// The key is decoded once here; connecting does not touch the file
    /// again.
    pub fn new(user: &str, key_path: impl AsRef<Path>) -> Result<Self, TransportError> {
        Self::with_config(user, key_path, None, ExecutorConfig::default())
    }

    pub fn with_config(
        user: &str,
        key_path: impl AsRef<Path>,
        passphrase: Option<&Zeroizing<String>>,
        config: ExecutorConfig,
    ) -> Result<Self, TransportError> {
        let connector = SshConnector::new(user, key_path, passphrase)?
            .with_server_check(config.server_check.clone());
        Ok(Self::with_connector(Box::new(connector), config))
    }

    /// Create an executor on top of any [`Connector`].
    pub fn with_connector(connector: Box<dyn Connector>, config: ExecutorConfig) -> Self {
        Self {
            connector,
            config,
            session: None,
        }
    }

    /// Create `count` independent executors that share one decoded key.
    pub fn many(
        user: &str,
        key_path: impl AsRef<Path>,
        count: usize,
    ) -> Result<Vec<Self>, TransportError> {
        let config = ExecutorConfig::default();
        let connector = SshConnector::new(user, key_path, None)?
            .with_server_check(config.server_check.clone());
        Ok((0..count)
            .map(|_| Self::with_connector(Box::new(connector.clone()), config.clone()))
            .collect())
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Address of the connected host, if any.
    pub fn host(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.host.as_str())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Connect to `host`, appending the default port when it has none.
    ///
    /// An existing session is closed first.
    pub async fn connect(&mut self, cancel: &CancellationToken, host: &str) -> Result<(), Error> {
        if let Some(previous) = self.session.take() {
            if let Err(e) = previous.transport.close().await {
                tracing::warn!("failed to close previous session to {}: {}", previous.host, e);
            }
        }

        let addr = normalize_host(host, self.config.default_port);
        let timeout = self.config.connect_timeout;

        let transport = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::DialFailed {
                    host: addr.clone(),
                    source: TransportError::Cancelled,
                });
            }
            res = tokio::time::timeout(timeout, self.connector.connect(&addr)) => match res {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(Error::DialFailed {
                        host: addr.clone(),
                        source: TransportError::IoError(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("connection timed out after {timeout:?}"),
                        )),
                    });
                }
            },
        };

        tracing::debug!("connected to {}", addr);
        self.session = Some(Session {
            host: addr,
            transport,
        });
        Ok(())
    }

    /// Close the session. Closing an executor that is not connected is a
    /// no-op.
    pub async fn close(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        tracing::debug!("closing connection to {}", session.host);
        session
            .transport
            .close()
            .await
            .map_err(|source| Error::CloseFailed {
                host: session.host,
                source,
            })
    }

    /// Run `command` and return its non-empty output lines.
    pub async fn run(&self, cancel: &CancellationToken, command: &str) -> Result<Vec<String>, Error> {
        runner::run_command(self.transport()?, cancel, command).await
    }

    /// Copy `local` to `remote`, optionally creating the remote parent
    /// directory, and carry the modification time over.
    ///
    /// Remote paths reach the shell single-quoted, so `~` is not expanded.
    /// Relative paths resolve against the login directory: use `dest`
    /// rather than `~/dest`.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        local: impl AsRef<Path>,
        remote: &str,
        mkdir: bool,
    ) -> Result<(), Error> {
        transfer::upload(self.transport()?, cancel, local.as_ref(), remote, mkdir).await
    }

    /// Copy `remote` to `local`, optionally creating the local parent
    /// directory.
    pub async fn download(
        &self,
        cancel: &CancellationToken,
        remote: &str,
        local: impl AsRef<Path>,
        mkdir: bool,
    ) -> Result<(), Error> {
        transfer::download(self.transport()?, cancel, remote, local.as_ref(), mkdir).await
    }

    /// Upload every file under `local_dir` that is missing from `remote_dir`
    /// or differs in size or modification time.
    ///
    /// Returns the synced paths relative to `local_dir`, sorted. Remote-only
    /// files are kept. `remote_dir` is taken literally, as for
    /// [`upload`](Self::upload).
    pub async fn sync(
        &self,
        cancel: &CancellationToken,
        local_dir: impl AsRef<Path>,
        remote_dir: &str,
    ) -> Result<Vec<String>, Error> {
        reconcile::sync(self.transport()?, cancel, local_dir.as_ref(), remote_dir).await
    }

    fn transport(&self) -> Result<&dyn Transport, Error> {
        self.session
            .as_ref()
            .map(|s| s.transport.as_ref())
            .ok_or(Error::NotConnected)
    }
}

/// Append `default_port` to `host` unless it already carries one.
fn normalize_host(host: &str, default_port: u16) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        return format!("[{host}]:{default_port}");
    }
    if host.starts_with('[') {
        return if host.ends_with(']') {
            format!("{host}:{default_port}")
        } else {
            host.to_string()
        };
    }
    match host.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{host}:{default_port}"),
    }
}
