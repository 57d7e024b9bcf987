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

//! SCP file transfer.
//!
//! The client side of the line-oriented copy protocol: the remote host runs
//! `scp -t <path>` (sink) for uploads and `scp -f <path>` (source) for
//! downloads, and every step is acknowledged with a single status byte.

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use super::connection::Client;
use crate::utils::shell_quote;

/// SCP protocol status codes.
const SCP_OK: u8 = 0;
const SCP_WARNING: u8 = 1;
const SCP_ERROR: u8 = 2;

/// Maximum line length for SCP protocol headers (64 KB).
const MAX_LINE_LENGTH: u64 = 64 * 1024;

impl Client {
    /// Copy `size` bytes from `source` to `remote_path` with permission bits
    /// `mode` (four octal digits, e.g. `0644`).
    ///
    /// The parent directory of `remote_path` must already exist.
    pub async fn scp_upload(
        &self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        remote_path: &str,
        mode: &str,
    ) -> Result<(), super::Error> {
        let channel = self.get_channel().await?;
        channel
            .exec(true, format!("scp -t {}", shell_quote(remote_path)))
            .await?;
        send_file(channel.into_stream(), source, size, remote_path, mode).await
    }

    /// Copy the remote file at `remote_path` into `sink`, returning the
    /// number of bytes received.
    pub async fn scp_download(
        &self,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, super::Error> {
        let channel = self.get_channel().await?;
        channel
            .exec(true, format!("scp -f {}", shell_quote(remote_path)))
            .await?;
        receive_file(channel.into_stream(), sink).await
    }
}

/// Drive the sink side of the remote scp process.
pub(crate) async fn send_file<S>(
    stream: S,
    source: &mut (dyn AsyncRead + Unpin + Send),
    size: u64,
    remote_path: &str,
    mode: &str,
) -> Result<(), super::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if mode.len() != 4 || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(super::Error::ScpProtocol(format!("invalid file mode {mode:?}")));
    }
    let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
    if file_name.is_empty() {
        return Err(super::Error::ScpProtocol(format!(
            "remote path {remote_path:?} has no file name"
        )));
    }

    let mut stream = BufReader::new(stream);
    read_ack(&mut stream).await?;

    stream
        .write_all(format!("C{mode} {size} {file_name}\n").as_bytes())
        .await?;
    stream.flush().await?;
    read_ack(&mut stream).await?;

    let copied = tokio::io::copy(&mut source.take(size), &mut stream).await?;
    if copied != size {
        return Err(super::Error::ScpProtocol(format!(
            "source ended after {copied} of {size} bytes"
        )));
    }
    stream.write_all(&[SCP_OK]).await?;
    stream.flush().await?;
    read_ack(&mut stream).await?;

    stream.shutdown().await?;
    Ok(())
}

/// Drive the source side of the remote scp process.
pub(crate) async fn receive_file<S>(
    stream: S,
    sink: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<u64, super::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    stream.write_all(&[SCP_OK]).await?;
    stream.flush().await?;

    let size = loop {
        let line = read_line(&mut stream).await?;
        match line.as_bytes().first().copied() {
            // Times record: T<mtime> 0 <atime> 0
            Some(b'T') => {
                stream.write_all(&[SCP_OK]).await?;
                stream.flush().await?;
            }
            Some(b'C') => break parse_file_header(&line)?,
            Some(SCP_WARNING | SCP_ERROR) => {
                return Err(super::Error::Scp(line[1..].trim_end().to_string()));
            }
            _ => {
                return Err(super::Error::ScpProtocol(format!(
                    "unexpected header {line:?}"
                )))
            }
        }
    };

    stream.write_all(&[SCP_OK]).await?;
    stream.flush().await?;

    let copied = tokio::io::copy(&mut (&mut stream).take(size), sink).await?;
    if copied != size {
        return Err(super::Error::ScpProtocol(format!(
            "remote closed after {copied} of {size} bytes"
        )));
    }
    sink.flush().await?;
    read_ack(&mut stream).await?;

    stream.write_all(&[SCP_OK]).await?;
    stream.shutdown().await?;
    Ok(size)
}

/// Parse `C<mode> <size> <filename>` and return the size.
fn parse_file_header(line: &str) -> Result<u64, super::Error> {
    let parts: Vec<&str> = line[1..].trim_end().splitn(3, ' ').collect();
    if parts.len() != 3 {
        return Err(super::Error::ScpProtocol(format!(
            "invalid file header {line:?}"
        )));
    }
    parts[1]
        .parse()
        .map_err(|_| super::Error::ScpProtocol(format!("invalid size in header {line:?}")))
}

async fn read_ack<R: AsyncBufRead + Unpin>(stream: &mut R) -> Result<(), super::Error> {
    match stream.read_u8().await? {
        SCP_OK => Ok(()),
        SCP_WARNING | SCP_ERROR => {
            let message = read_line(stream).await?;
            Err(super::Error::Scp(message.trim_end().to_string()))
        }
        other => Err(super::Error::ScpProtocol(format!(
            "unexpected status byte {other}"
        ))),
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(stream: &mut R) -> Result<String, super::Error> {
    let mut buf = Vec::new();
    (&mut *stream)
        .take(MAX_LINE_LENGTH)
        .read_until(b'\n', &mut buf)
        .await?;
    if buf.last() != Some(&b'\n') {
        return Err(super::Error::ScpProtocol(
            "connection closed in the middle of a header".to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
