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

//! An asynchronous SSH client for the tokio runtime, built on russh.
//!
//! The heart of this module is [`Client`]: dial, authenticate with a
//! private key, run commands on exec channels and copy files with SCP.

pub mod authentication;
pub mod channel_manager;
pub mod connection;
pub mod error;
pub mod file_transfer;

pub use authentication::{Identity, ServerCheckMethod};
pub use channel_manager::{CommandExecutedResult, ExecChannel};
pub use connection::{Client, ClientHandler};
pub use error::Error;

// Re-export russh types commonly used with this module
pub use russh::client::Config;
