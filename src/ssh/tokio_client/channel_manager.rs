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

//! SSH exec channels.
//!
//! Every command runs in its own session channel. The channel stays open
//! until the command reports its exit status, so the caller can deliver an
//! interrupt signal while it waits.

use russh::client::Msg;
use russh::Channel;

use super::connection::Client;

/// Buffer size for SSH command stdout.
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// Small buffer size for stderr, usually a short diagnostic.
const SSH_RESPONSE_BUFFER_SIZE: usize = 1024;

/// Output of a finished remote command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CommandExecutedResult {
    /// The stdout output of the command.
    pub stdout: Vec<u8>,
    /// The stderr output of the command.
    pub stderr: Vec<u8>,
    /// The unix exit status (`$?` in bash).
    pub exit_status: u32,
}

/// A command started on the remote host and not yet waited on.
pub struct ExecChannel {
    channel: Channel<Msg>,
    command: String,
}

impl Client {
    /// Get a new SSH channel for communication.
    pub async fn get_channel(&self) -> Result<Channel<Msg>, super::Error> {
        self.connection_handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)
    }

    /// Start `command` on the remote host.
    ///
    /// Every invocation is a new shell context, so `cd`, variables and the
    /// like do not carry over to later commands.
    pub async fn start_command(&self, command: &str) -> Result<ExecChannel, super::Error> {
        let channel = self.get_channel().await?;
        channel.exec(true, command).await?;
        Ok(ExecChannel {
            channel,
            command: command.to_string(),
        })
    }
}

impl ExecChannel {
    /// Collect the command output until the channel closes.
    pub async fn wait(&mut self) -> Result<CommandExecutedResult, super::Error> {
        let mut stdout_buffer = Vec::with_capacity(SSH_CMD_BUFFER_SIZE);
        let mut stderr_buffer = Vec::with_capacity(SSH_RESPONSE_BUFFER_SIZE);
        let mut result: Option<u32> = None;

        while let Some(msg) = self.channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout_buffer.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr_buffer.extend_from_slice(data);
                    }
                }
                // The exit status may arrive before the last data packet,
                // keep reading until the channel is closed.
                russh::ChannelMsg::ExitStatus { exit_status } => result = Some(exit_status),
                russh::ChannelMsg::ExitSignal { signal_name, .. } => {
                    tracing::debug!(
                        command = %self.command,
                        "remote process terminated by signal {:?}",
                        signal_name
                    );
                }
                _ => {}
            }
        }

        match result {
            Some(exit_status) => Ok(CommandExecutedResult {
                stdout: stdout_buffer,
                stderr: stderr_buffer,
                exit_status,
            }),
            None => Err(super::Error::CommandDidntExit),
        }
    }

    /// Deliver SIGINT to the remote process.
    pub async fn interrupt(&self) -> Result<(), super::Error> {
        self.channel
            .signal(russh::Sig::INT)
            .await
            .map_err(super::Error::SshError)
    }
}
