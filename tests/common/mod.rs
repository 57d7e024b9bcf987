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

//! In-memory remote host driving the executor through its transport traits.
//!
//! Only the shell commands the executor issues are understood, plus `echo`,
//! `printf`, `true` and `false` for runner tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sshsync::remote::{
    Connector, Error, Executor, ExecutorConfig, ProcessOutput, RemoteProcess, Transport,
    TransportError,
};

/// Offset of the host's local time zone from UTC, east positive.
pub const LOCAL_UTC_OFFSET_SECS: i64 = 2 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub data: Vec<u8>,
    pub mtime: i64,
    pub mode: String,
}

#[derive(Debug, Default)]
pub struct RemoteState {
    pub files: BTreeMap<String, RemoteFile>,
    pub dirs: BTreeSet<String>,
    /// Every command and copy in the order it reached the host.
    pub commands: Vec<String>,
    pub connected_to: Vec<String>,
    pub interrupts: usize,
    pub closed: bool,
    /// Commands containing this never finish.
    pub hang_on: Option<String>,
    /// Commands containing this exit with status 1.
    pub fail_on: Option<String>,
    pub fail_signal: bool,
    pub connect_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        let mut state = RemoteState::default();
        state.dirs.insert("/".to_string());
        state.dirs.insert("/tmp".to_string());
        state.dirs.insert("/dev".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn add_dir(&self, path: &str) {
        add_dir_all(&mut self.state(), path);
    }

    pub fn add_file(&self, path: &str, data: &[u8], mtime: i64) {
        let mut state = self.state();
        add_dir_all(&mut state, parent(path));
        state.files.insert(
            path.to_string(),
            RemoteFile {
                data: data.to_vec(),
                mtime,
                mode: "0644".to_string(),
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        self.state().files.get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(FakeConnector {
            remote: self.clone(),
        })
    }

    /// An executor connected to this host.
    pub async fn executor(&self) -> Executor {
        let mut executor = Executor::with_connector(self.connector(), ExecutorConfig::default());
        executor
            .connect(&tokio_util::sync::CancellationToken::new(), "fake.host")
            .await
            .unwrap();
        executor
    }

    fn exec(&self, command: &str) -> Result<ProcessOutput, TransportError> {
        let mut args = split_shell_words(command);
        let mut state = self.state();
        // leading NAME=value words set the environment
        let mut env = BTreeMap::new();
        while let Some((name, value)) = args.first().and_then(|w| w.split_once('=')) {
            env.insert(name.to_string(), value.to_string());
            args.remove(0);
        }
        let utc = env.get("TZ").is_some_and(|tz| tz == "UTC");

        if let Some(pattern) = state.fail_on.as_deref() {
            if command.contains(pattern) {
                let name = args.first().cloned().unwrap_or_default();
                return Ok(failure(1, &format!("{name}: Operation not permitted")));
            }
        }

        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or("");

        let output = match arg(0) {
            "mkdir" if arg(1) == "-p" => {
                let dir = arg(2);
                if dir.starts_with("/dev/") {
                    failure(1, &format!("mkdir: cannot create directory '{dir}': Permission denied"))
                } else {
                    add_dir_all(&mut state, dir);
                    success("")
                }
            }
            "test" if arg(1) == "-d" => {
                if state.dirs.contains(&normalize(arg(2))) {
                    success("")
                } else {
                    failure(1, "")
                }
            }
            "find" => {
                let base = normalize(arg(1));
                if !state.dirs.contains(&base) {
                    return Ok(failure(1, &format!("find: '{base}': No such file or directory")));
                }
                let prefix = if base == "/" { "/".to_string() } else { format!("{base}/") };
                let listing: String = state
                    .files
                    .iter()
                    .filter(|(path, _)| path.starts_with(&prefix))
                    .map(|(path, f)| format!("{}:{}:{}\n", path, f.data.len(), f.mtime))
                    .collect();
                success(&listing)
            }
            "touch" if arg(1) == "-m" && arg(2) == "-t" => {
                let mtime = match NaiveDateTime::parse_from_str(arg(3), "%Y%m%d%H%M.%S") {
                    Ok(t) if utc => t.and_utc().timestamp(),
                    Ok(t) => t.and_utc().timestamp() - LOCAL_UTC_OFFSET_SECS,
                    Err(_) => return Ok(failure(1, "touch: invalid date format")),
                };
                match state.files.get_mut(arg(4)) {
                    Some(file) => {
                        file.mtime = mtime;
                        success("")
                    }
                    None => failure(1, "touch: cannot touch: No such file or directory"),
                }
            }
            "echo" => success(&format!("{}\n", args[1..].join(" "))),
            "printf" => success(&arg(1).replace("\\n", "\n")),
            "true" => success(""),
            "false" => failure(1, ""),
            other => failure(127, &format!("sh: {other}: command not found")),
        };
        Ok(output)
    }
}

fn success(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        exit_status: 0,
    }
}

fn failure(status: u32, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        exit_status: status,
    }
}

fn normalize(path: &str) -> String {
    match path.trim_end_matches('/') {
        "" if path.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((dir, _)) => dir,
        None => ".",
    }
}

fn add_dir_all(state: &mut RemoteState, path: &str) {
    let mut dir = normalize(path);
    while dir != "/" && dir != "." && !dir.is_empty() {
        let next = parent(&dir).to_string();
        state.dirs.insert(dir);
        dir = next;
    }
}

/// Split a command line into words, honouring single quotes and backslash
/// escapes.
pub fn split_shell_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

struct FakeConnector {
    remote: FakeRemote,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, addr: &str) -> Result<Box<dyn Transport>, Error> {
        let delay = {
            let mut state = self.remote.state();
            state.connected_to.push(addr.to_string());
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Box::new(FakeTransport {
            remote: self.remote.clone(),
            addr: addr.to_string(),
        }))
    }
}

struct FakeTransport {
    remote: FakeRemote,
    addr: String,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn spawn(&self, command: &str) -> Result<Box<dyn RemoteProcess>, TransportError> {
        let hangs = {
            let mut state = self.remote.state();
            state.commands.push(command.to_string());
            state
                .hang_on
                .as_deref()
                .is_some_and(|pattern| command.contains(pattern))
        };
        let process = if hangs {
            FakeProcess {
                remote: self.remote.clone(),
                output: None,
            }
        } else {
            FakeProcess {
                remote: self.remote.clone(),
                output: Some(self.remote.exec(command)?),
            }
        };
        Ok(Box::new(process))
    }

    async fn copy_to(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        remote_path: &str,
        mode: &str,
    ) -> Result<(), TransportError> {
        let mut data = Vec::new();
        source.read_to_end(&mut data).await?;
        assert_eq!(data.len() as u64, size);

        let mut state = self.remote.state();
        state.commands.push(format!("scp -t {remote_path}"));
        if !state.dirs.contains(parent(remote_path)) {
            return Err(TransportError::Scp(format!(
                "scp: {remote_path}: No such file or directory"
            )));
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        state.files.insert(
            remote_path.to_string(),
            RemoteFile {
                data,
                mtime: now,
                mode: mode.to_string(),
            },
        );
        Ok(())
    }

    async fn copy_from(
        &self,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, TransportError> {
        let data = {
            let mut state = self.remote.state();
            state.commands.push(format!("scp -f {remote_path}"));
            match state.files.get(remote_path) {
                Some(file) => file.data.clone(),
                None => {
                    return Err(TransportError::Scp(format!(
                        "scp: {remote_path}: No such file or directory"
                    )))
                }
            }
        };
        sink.write_all(&data).await?;
        Ok(data.len() as u64)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.remote.state().closed = true;
        Ok(())
    }

    fn remote_addr(&self) -> String {
        self.addr.clone()
    }
}

struct FakeProcess {
    remote: FakeRemote,
    /// `None` for a process that never exits.
    output: Option<ProcessOutput>,
}

#[async_trait]
impl RemoteProcess for FakeProcess {
    async fn wait(&mut self) -> Result<ProcessOutput, TransportError> {
        match self.output.take() {
            Some(output) => Ok(output),
            None => std::future::pending().await,
        }
    }

    async fn interrupt(&mut self) -> Result<(), TransportError> {
        let mut state = self.remote.state();
        state.interrupts += 1;
        if state.fail_signal {
            return Err(TransportError::IoError(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel closed",
            )));
        }
        Ok(())
    }
}
