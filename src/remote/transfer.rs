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

//! Single-file upload and download.

use std::fs::Metadata;
use std::path::Path;
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::error::Error;
use super::runner::run_command;
use super::transport::Transport;
use crate::ssh::tokio_client::Error as TransportError;
use crate::utils::shell_quote;

/// Mode given to local directories created for downloads.
#[cfg(unix)]
const LOCAL_DIR_MODE: u32 = 0o750;

/// `touch -t` timestamp layout: `[[CC]YY]MMDDhhmm[.ss]`, run with `TZ=UTC`.
const TOUCH_TIME_FORMAT: &str = "%Y%m%d%H%M.%S";

/// Upload `local` to `remote`, then copy the local modification time over.
pub(crate) async fn upload(
    transport: &dyn Transport,
    cancel: &CancellationToken,
    local: &Path,
    remote: &str,
    mkdir: bool,
) -> Result<(), Error> {
    tracing::debug!(
        "upload {} to {}:{}",
        local.display(),
        transport.remote_addr(),
        remote
    );
    let started = Instant::now();

    if mkdir {
        let dir = remote_parent(remote);
        run_command(transport, cancel, &format!("mkdir -p {}", shell_quote(dir)))
            .await
            .map_err(|source| Error::CreateRemoteDirFailed {
                dir: dir.to_string(),
                source: Box::new(source),
            })?;
    }

    let copy_failed = |source: TransportError| Error::CopyFailed {
        path: remote.to_string(),
        source,
    };
    let mut file = tokio::fs::File::open(local)
        .await
        .map_err(|e| copy_failed(e.into()))?;
    let metadata = file.metadata().await.map_err(|e| copy_failed(e.into()))?;
    let mode = permission_bits(&metadata);
    tracing::debug!("file mode for {}: {}", local.display(), mode);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(copy_failed(TransportError::Cancelled)),
        res = transport.copy_to(&mut file, metadata.len(), remote, &mode) => res.map_err(copy_failed)?,
    }

    let modified = metadata.modified().map_err(|e| copy_failed(e.into()))?;
    let touch = format!(
        "TZ=UTC touch -m -t {} {}",
        format_touch_time(modified),
        shell_quote(remote)
    );
    run_command(transport, cancel, &touch)
        .await
        .map_err(|source| Error::SetModTimeFailed {
            path: remote.to_string(),
            source: Box::new(source),
        })?;

    tracing::info!(
        "uploaded {} to {}:{} in {:?}",
        local.display(),
        transport.remote_addr(),
        remote,
        started.elapsed()
    );
    Ok(())
}

/// Download `remote` into `local`.
///
/// Permissions of the remote file are not carried over.
pub(crate) async fn download(
    transport: &dyn Transport,
    cancel: &CancellationToken,
    remote: &str,
    local: &Path,
    mkdir: bool,
) -> Result<(), Error> {
    tracing::debug!(
        "download {}:{} to {}",
        transport.remote_addr(),
        remote,
        local.display()
    );
    let started = Instant::now();

    if mkdir {
        if let Some(dir) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_local_dir(dir)
                .await
                .map_err(|source| Error::CreateLocalDirFailed {
                    dir: dir.to_path_buf(),
                    source,
                })?;
        }
    }

    let copy_failed = |source: TransportError| Error::CopyFailed {
        path: remote.to_string(),
        source,
    };
    let mut file = tokio::fs::File::create(local)
        .await
        .map_err(|e| copy_failed(e.into()))?;

    let received = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(copy_failed(TransportError::Cancelled)),
        res = transport.copy_from(remote, &mut file) => res.map_err(copy_failed)?,
    };
    file.flush().await.map_err(|e| copy_failed(e.into()))?;
    file.sync_all().await.map_err(|e| copy_failed(e.into()))?;

    tracing::debug!(
        "download done for {} ({} bytes) in {:?}",
        local.display(),
        received,
        started.elapsed()
    );
    Ok(())
}

async fn create_local_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(LOCAL_DIR_MODE);
    builder.create(dir).await
}

/// Parent directory of a remote path, `.` when there is none.
fn remote_parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None if path.starts_with('/') => "/",
        None => ".",
    }
}

/// Permission bits as four octal digits, the way the copy protocol wants them.
fn permission_bits(metadata: &Metadata) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        format!("{:04o}", metadata.permissions().mode() & 0o777)
    }
    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            "0444".to_string()
        } else {
            "0644".to_string()
        }
    }
}

/// Modification time in UTC, truncated to whole seconds, in `touch -t` form.
fn format_touch_time(modified: SystemTime) -> String {
    DateTime::<Utc>::from(modified)
        .format(TOUCH_TIME_FORMAT)
        .to_string()
}
