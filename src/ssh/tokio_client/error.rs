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

//! Transport-level errors raised by the SSH client.

use std::io;

/// Errors produced by the SSH transport, the command channels and the
/// SCP copy primitive.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid address was provided: {0}")]
    AddressInvalid(io::Error),
    #[error("the private key could not be decoded: {0}")]
    KeyInvalid(russh::keys::Error),
    #[error("the server rejected the private key")]
    KeyAuthFailed,
    #[error("server host key check failed")]
    ServerCheckFailed,
    #[error("the remote command did not report an exit status")]
    CommandDidntExit,
    #[error("process exited with status {status}{}", stderr_suffix(.stderr))]
    ExitStatus { status: u32, stderr: String },
    /// Error reported by the remote scp process, e.g. `scp: /x: No such file or directory`.
    #[error("{0}")]
    Scp(String),
    #[error("scp protocol error: {0}")]
    ScpProtocol(String),
    #[error("operation canceled")]
    Cancelled,
    #[error("ssh error occurred: {0}")]
    SshError(#[from] russh::Error),
    #[error("i/o error: {0}")]
    IoError(#[from] io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    match stderr.trim() {
        "" => String::new(),
        trimmed => format!(": {trimmed}"),
    }
}

impl Error {
    /// Standard error output captured from a command that exited non-zero.
    pub fn remote_stderr(&self) -> Option<&str> {
        match self {
            Error::ExitStatus { stderr, .. } if !stderr.is_empty() => Some(stderr.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_message() {
        let err = Error::ExitStatus {
            status: 1,
            stderr: "mkdir: cannot create directory\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "process exited with status 1: mkdir: cannot create directory"
        );
        assert_eq!(err.remote_stderr(), Some("mkdir: cannot create directory\n"));

        let silent = Error::ExitStatus {
            status: 2,
            stderr: " \n".to_string(),
        };
        assert_eq!(silent.to_string(), "process exited with status 2");
        assert_eq!(silent.remote_stderr(), Some(" \n"));
    }

    #[test]
    fn test_scp_message_is_kept_verbatim() {
        let err = Error::Scp("scp: /tmp/blah/data.txt: No such file or directory".to_string());
        assert_eq!(
            err.to_string(),
            "scp: /tmp/blah/data.txt: No such file or directory"
        );
        assert!(err.remote_stderr().is_none());
    }
}
