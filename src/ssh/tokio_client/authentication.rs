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

//! Public-key identity and server host key verification.
//!
//! The private key is read and decoded once when the [`Identity`] is built,
//! so every later connection reuses the same key material.

use russh::client::{Handle, Handler};
use russh::keys::PrivateKey;
use std::path::Path;
use std::sync::Arc;
use zeroize::Zeroizing;

/// A user name paired with a decoded private key.
#[derive(Clone)]
pub struct Identity {
    username: String,
    key: Arc<PrivateKey>,
}

impl Identity {
    /// Read and decode the private key at `key_file_path`.
    pub fn from_key_file<T: AsRef<Path>>(
        username: &str,
        key_file_path: T,
        passphrase: Option<&Zeroizing<String>>,
    ) -> Result<Self, super::Error> {
        let key = russh::keys::load_secret_key(key_file_path, passphrase.map(|p| p.as_str()))
            .map_err(super::Error::KeyInvalid)?;
        Ok(Self::from_key(username, key))
    }

    /// Decode a private key held in memory (OpenSSH or PEM text).
    pub fn from_key_data(
        username: &str,
        key_data: &str,
        passphrase: Option<&Zeroizing<String>>,
    ) -> Result<Self, super::Error> {
        let key = russh::keys::decode_secret_key(key_data, passphrase.map(|p| p.as_str()))
            .map_err(super::Error::KeyInvalid)?;
        Ok(Self::from_key(username, key))
    }

    pub fn from_key(username: &str, key: PrivateKey) -> Self {
        Self {
            username: username.to_string(),
            key: Arc::new(key),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("key", &self.key.algorithm().as_str())
            .finish()
    }
}

/// Server host key verification methods.
///
/// The default is [`ServerCheckMethod::NoCheck`]: any host key is accepted.
/// This trades man-in-the-middle protection for zero-setup connections to
/// freshly provisioned hosts; pick a known_hosts check when the host keys
/// are managed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    /// No verification - accept any host key
    #[default]
    NoCheck,
    /// Use default known_hosts file (~/.ssh/known_hosts)
    DefaultKnownHostsFile,
    /// Use a specific known_hosts file path
    KnownHostsFile(String),
}

impl ServerCheckMethod {
    /// Convenience method to create a [`ServerCheckMethod`] from a string literal.
    pub fn with_known_hosts_file(known_hosts_file: &str) -> Self {
        Self::KnownHostsFile(known_hosts_file.to_string())
    }
}

/// This takes a handle and performs public-key authentication.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    identity: &Identity,
) -> Result<(), super::Error> {
    let is_authentificated = handle
        .authenticate_publickey(
            identity.username.as_str(),
            russh::keys::PrivateKeyWithHashAlg::new(
                Arc::clone(&identity.key),
                handle.best_supported_rsa_hash().await?.flatten(),
            ),
        )
        .await?;
    if !is_authentificated.success() {
        return Err(super::Error::KeyAuthFailed);
    }
    Ok(())
}
