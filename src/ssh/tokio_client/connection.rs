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

//! SSH connection establishment.
//!
//! Dialing and the SSH handshake are separate steps so callers can tell a
//! host that cannot be reached from one that refuses the session.

use russh::client::{Config, Handle, Handler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::{fmt::Debug, io};
use tokio::net::TcpStream;

use super::authentication::{Identity, ServerCheckMethod};

/// An authenticated ssh connection to a remote server.
///
/// Open the TCP stream with [`Client::dial`], then hand it to
/// [`Client::connect_stream`] to run the handshake and authenticate.
///
/// # Examples
///
/// ```no_run
/// use sshsync::ssh::tokio_client::{Client, Identity, ServerCheckMethod};
/// #[tokio::main]
/// async fn main() -> Result<(), sshsync::ssh::tokio_client::Error> {
///     let identity = Identity::from_key_file("root", "/home/me/.ssh/id_ed25519", None)?;
///     let stream = Client::dial("10.10.10.2:22").await?;
///     let client = Client::connect_stream(
///         stream,
///         "10.10.10.2",
///         &identity,
///         ServerCheckMethod::NoCheck,
///         Default::default(),
///     )
///     .await?;
///     client.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    pub(super) connection_handle: Arc<Handle<ClientHandler>>,
    pub(super) username: String,
    pub(super) address: SocketAddr,
}

impl Client {
    /// Resolve `addr` (`host:port`) and open a TCP connection.
    ///
    /// If `addr` resolves to multiple addresses, each one is tried in turn
    /// until a connection succeeds; the last failure is returned otherwise.
    pub async fn dial(addr: &str) -> Result<TcpStream, super::Error> {
        let socket_addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(super::Error::AddressInvalid)?;
        let mut connect_res = Err(super::Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )));
        for socket_addr in socket_addrs {
            match TcpStream::connect(socket_addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => connect_res = Err(super::Error::IoError(e)),
            }
        }
        connect_res
    }

    /// Run the SSH handshake over an already connected stream and
    /// authenticate with `identity`.
    pub async fn connect_stream(
        stream: TcpStream,
        hostname: &str,
        identity: &Identity,
        server_check: ServerCheckMethod,
        config: Arc<Config>,
    ) -> Result<Self, super::Error> {
        let address = stream.peer_addr()?;
        let handler = ClientHandler::new(hostname.to_string(), address, server_check);
        let mut handle = russh::client::connect_stream(config, stream, handler).await?;

        super::authentication::authenticate(&mut handle, identity).await?;

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: identity.username().to_string(),
            address,
        })
    }

    /// A debugging function to get the username this client is connected as.
    pub fn get_connection_username(&self) -> &String {
        &self.username
    }

    /// A debugging function to get the address this client is connected to.
    pub fn get_connection_address(&self) -> &SocketAddr {
        &self.address
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// SSH client handler for managing server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    host: SocketAddr,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    /// Create a new client handler.
    pub fn new(hostname: String, host: SocketAddr, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            host,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::KnownHostsFile(known_hosts_path) => {
                russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.host.port(),
                    server_public_key,
                    known_hosts_path,
                )
                .map_err(|_| super::Error::ServerCheckFailed)
            }
            ServerCheckMethod::DefaultKnownHostsFile => russh::keys::check_known_hosts(
                &self.hostname,
                self.host.port(),
                server_public_key,
            )
            .map_err(|_| super::Error::ServerCheckFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_unresolvable_host() {
        let err = Client::dial("no-such-host.invalid:22").await.unwrap_err();
        assert!(matches!(err, super::super::Error::AddressInvalid(_)));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port with nothing listening on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Client::dial(&addr.to_string()).await.unwrap_err();
        assert!(matches!(err, super::super::Error::IoError(_)));
    }
}
