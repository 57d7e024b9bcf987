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

//! Error taxonomy of the remote executor.
//!
//! Every variant names the operation and the host, command or path it was
//! working on, and keeps the underlying cause in the `source()` chain.

use std::io;
use std::path::PathBuf;

use crate::ssh::tokio_client::Error as TransportError;

/// Cause carried by [`Error::Canceled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation canceled")]
pub struct Cancelled;

/// Errors returned by [`Executor`](super::Executor) operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("client is not connected")]
    NotConnected,

    #[error("failed to dial {host}: {source}")]
    DialFailed {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to create client connection to {host}: {source}")]
    HandshakeFailed {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to close connection to {host}: {source}")]
    CloseFailed {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to send interrupt signal to remote process: {source}")]
    SignalFailed {
        #[source]
        source: TransportError,
    },

    #[error("canceled: {0}")]
    Canceled(#[source] Cancelled),

    #[error("failed to run command {command:?} on remote server: {source}")]
    RemoteCommandFailed {
        command: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to create remote directory {dir}: {source}")]
    CreateRemoteDirFailed {
        dir: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to create local directory {}: {source}", dir.display())]
    CreateLocalDirFailed {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy file {path}: {source}")]
    CopyFailed {
        path: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to set modification time of remote file {path}: {source}")]
    SetModTimeFailed {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to walk local directory {}: {source}", dir.display())]
    WalkFailed {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid line format {line:?}: {reason}")]
    ParseFailed { line: String, reason: String },

    #[error("failed to get local files properties for {}: {source}", dir.display())]
    LocalInventoryFailed {
        dir: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to get remote files properties for {dir}: {source}")]
    RemoteInventoryFailed {
        dir: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to upload {} to {remote}: {source}", local.display())]
    UploadFailed {
        local: PathBuf,
        remote: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether this error, or any error it wraps, is a cancellation.
    pub fn is_canceled(&self) -> bool {
        match self {
            Error::Canceled(_) => true,
            Error::DialFailed { source, .. }
            | Error::HandshakeFailed { source, .. }
            | Error::CopyFailed { source, .. } => matches!(source, TransportError::Cancelled),
            Error::CreateRemoteDirFailed { source, .. }
            | Error::SetModTimeFailed { source, .. }
            | Error::LocalInventoryFailed { source, .. }
            | Error::RemoteInventoryFailed { source, .. }
            | Error::UploadFailed { source, .. } => source.is_canceled(),
            _ => false,
        }
    }
}
