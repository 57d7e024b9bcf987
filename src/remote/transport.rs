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

//! Capability interfaces between the executor and the wire.
//!
//! The executor only needs to start commands, copy a byte stream to or from
//! a remote path and close the connection. [`Connector`] produces a
//! [`Transport`] for a host; the russh-backed implementation lives in
//! [`crate::ssh`], and any other implementation can be substituted.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::Error;
use crate::ssh::tokio_client::Error as TransportError;

pub use crate::ssh::tokio_client::CommandExecutedResult as ProcessOutput;

/// Establishes a connected [`Transport`] to `host:port`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial `addr` and perform the secure-channel handshake.
    ///
    /// Failures are reported as [`Error::DialFailed`] or
    /// [`Error::HandshakeFailed`].
    async fn connect(&self, addr: &str) -> Result<Box<dyn Transport>, Error>;
}

/// A live connection to one remote host.
///
/// Callers run one command or transfer at a time; implementations are not
/// required to support concurrent use.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start `command` in a fresh remote shell.
    async fn spawn(&self, command: &str) -> Result<Box<dyn RemoteProcess>, TransportError>;

    /// Copy exactly `size` bytes from `source` to `remote_path`, creating the
    /// file with permission bits `mode` (e.g. `0644`).
    async fn copy_to(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        remote_path: &str,
        mode: &str,
    ) -> Result<(), TransportError>;

    /// Copy the remote file at `remote_path` into `sink`.
    async fn copy_from(
        &self,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, TransportError>;

    /// Release the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Address of the remote end, for diagnostics.
    fn remote_addr(&self) -> String;
}

/// A command running on the remote host.
#[async_trait]
pub trait RemoteProcess: Send {
    /// Wait for the command to finish and collect its output.
    async fn wait(&mut self) -> Result<ProcessOutput, TransportError>;

    /// Deliver an interrupt signal to the command.
    async fn interrupt(&mut self) -> Result<(), TransportError>;
}
