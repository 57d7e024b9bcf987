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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sshsync",
    version,
    about = "Remote command execution and one-way directory sync over SSH",
    long_about = "sshsync connects to a single host with an SSH private key, runs shell commands and\nmoves files over SCP. The sync command uploads only the files whose size or\nmodification time differ from the remote copy; remote-only files are never removed.",
    after_help = "EXAMPLES:\n  Run a command:          sshsync -H host -u deploy -i ~/.ssh/id_ed25519 run uptime\n  Upload with mkdir:      sshsync -H host upload --mkdir app.tar.gz /opt/app/app.tar.gz\n  Download a file:        sshsync -H host download /var/log/syslog ./logs/syslog\n  Sync a directory:       sshsync -H host:2222 sync ./site /var/www/site"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'H',
        long,
        help = "Remote host in hostname[:port] format\nPort 22 is used if not specified"
    )]
    pub host: String,

    #[arg(short = 'u', long, env = "SSHSYNC_USER", help = "Username for the SSH connection")]
    pub user: String,

    #[arg(
        short = 'i',
        long,
        env = "SSHSYNC_IDENTITY",
        help = "SSH private key file path\nEncrypted keys read their passphrase from SSHSYNC_KEY_PASSPHRASE"
    )]
    pub identity: PathBuf,

    #[arg(
        long,
        env = "SSHSYNC_KEY_PASSPHRASE",
        hide = true,
        hide_env_values = true
    )]
    pub key_passphrase: Option<String>,

    #[arg(
        long,
        default_value = "30",
        help = "Connection timeout in seconds, covering dial and handshake"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        help = "Verify the host key against this known_hosts file\nAny host key is accepted when omitted"
    )]
    pub known_hosts: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run a shell command on the remote host",
        long_about = "Runs the command in a remote shell and prints its non-empty output lines.\nCtrl-C interrupts the remote command.\n\nExit codes: 0 (success), 1 (failure or non-zero remote exit status)"
    )]
    Run {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    #[command(about = "Upload a single file and keep its modification time")]
    Upload {
        source: PathBuf,

        destination: String,

        #[arg(long, help = "Create the remote parent directory first")]
        mkdir: bool,
    },

    #[command(about = "Download a single file")]
    Download {
        source: String,

        destination: PathBuf,

        #[arg(long, help = "Create the local parent directory first")]
        mkdir: bool,
    },

    #[command(
        about = "Upload changed files from a local directory",
        long_about = "Compares the local directory with the remote one and uploads every file that is\nmissing remotely or differs in size, or in modification time by more than one second.\nSynced paths are printed relative to the local directory, in sorted order.",
        after_help = "Examples:\n  sshsync -H host sync ./build /srv/app/build"
    )]
    Sync {
        local_dir: PathBuf,

        remote_dir: String,
    },
}

impl Cli {
    pub fn get_command(&self) -> String {
        match &self.command {
            Commands::Run { command } => command.join(" "),
            _ => String::new(),
        }
    }
}
