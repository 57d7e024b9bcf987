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

//! russh-backed implementation of the executor's transport interfaces.

use async_trait::async_trait;
use russh::client::Config;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use zeroize::Zeroizing;

use super::tokio_client::{Client, Error, ExecChannel, Identity, ServerCheckMethod};
use crate::remote::transport::{Connector, ProcessOutput, RemoteProcess, Transport};

/// Opens SSH connections with a private key that was decoded once, up front.
#[derive(Debug, Clone)]
pub struct SshConnector {
    identity: Identity,
    server_check: ServerCheckMethod,
    config: Arc<Config>,
}

impl SshConnector {
    /// Read the private key for `user` from `key_path`.
    pub fn new(
        user: &str,
        key_path: impl AsRef<Path>,
        passphrase: Option<&Zeroizing<String>>,
    ) -> Result<Self, Error> {
        Ok(Self::from_identity(Identity::from_key_file(
            user, key_path, passphrase,
        )?))
    }

    pub fn from_identity(identity: Identity) -> Self {
        Self {
            identity,
            server_check: ServerCheckMethod::default(),
            config: Arc::new(Config::default()),
        }
    }

    /// Replace the host key policy (defaults to accepting any key).
    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, addr: &str) -> Result<Box<dyn Transport>, crate::remote::Error> {
        tracing::debug!("create ssh session to {}", addr);
        let stream = Client::dial(addr)
            .await
            .map_err(|source| crate::remote::Error::DialFailed {
                host: addr.to_string(),
                source,
            })?;

        let hostname = split_hostname(addr);
        let client = Client::connect_stream(
            stream,
            hostname,
            &self.identity,
            self.server_check.clone(),
            Arc::clone(&self.config),
        )
        .await
        .map_err(|source| crate::remote::Error::HandshakeFailed {
            host: addr.to_string(),
            source,
        })?;

        tracing::debug!(
            "ssh session created to {} as {}",
            client.get_connection_address(),
            client.get_connection_username()
        );
        Ok(Box::new(client))
    }
}

/// Host part of `host:port`, without IPv6 brackets.
fn split_hostname(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

#[async_trait]
impl Transport for Client {
    async fn spawn(&self, command: &str) -> Result<Box<dyn RemoteProcess>, Error> {
        Ok(Box::new(self.start_command(command).await?))
    }

    async fn copy_to(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        remote_path: &str,
        mode: &str,
    ) -> Result<(), Error> {
        self.scp_upload(source, size, remote_path, mode).await
    }

    async fn copy_from(
        &self,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, Error> {
        self.scp_download(remote_path, sink).await
    }

    async fn close(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Ok(());
        }
        self.disconnect().await
    }

    fn remote_addr(&self) -> String {
        self.get_connection_address().to_string()
    }
}

#[async_trait]
impl RemoteProcess for ExecChannel {
    async fn wait(&mut self) -> Result<ProcessOutput, Error> {
        ExecChannel::wait(self).await
    }

    async fn interrupt(&mut self) -> Result<(), Error> {
        ExecChannel::interrupt(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_hostname() {
        assert_eq!(split_hostname("example.com:22"), "example.com");
        assert_eq!(split_hostname("10.0.0.1:2222"), "10.0.0.1");
        assert_eq!(split_hostname("[::1]:22"), "::1");
        assert_eq!(split_hostname("example.com"), "example.com");
    }

    fn test_connector() -> SshConnector {
        let key_path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testdata/test_ssh_key");
        SshConnector::new("test", key_path, None).unwrap()
    }

    #[test]
    fn test_connector_loads_key_once() {
        let connector = test_connector();
        assert_eq!(connector.identity().username(), "test");
        assert_eq!(connector.server_check, ServerCheckMethod::NoCheck);
    }

    #[tokio::test]
    async fn test_connect_refused_is_dial_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = test_connector().connect(&addr).await.err().unwrap();
        assert!(matches!(err, crate::remote::Error::DialFailed { .. }));
    }
}
