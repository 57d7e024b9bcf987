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

//! Local and remote directory inventories.
//!
//! An inventory maps a file's path relative to the inventoried directory
//! (always `/`-separated) to its size and modification time. Directories are
//! never listed.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::error::Error;
use super::runner::run_command;
use super::transport::Transport;
use crate::utils::shell_quote;

/// Metadata compared between the two sides of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProperties {
    pub size: u64,
    pub mod_time: SystemTime,
    /// Informational only, never compared.
    pub name: String,
}

/// Relative path to file metadata, one side of a sync.
pub type Inventory = HashMap<String, FileProperties>;

/// Walk `dir` recursively and record every regular file in it.
///
/// Symlinks are not followed and are not recorded.
pub fn local_inventory(dir: &Path) -> Result<Inventory, Error> {
    let walk_failed = |source: io::Error| Error::WalkFailed {
        dir: dir.to_path_buf(),
        source,
    };

    let root = std::fs::metadata(dir).map_err(walk_failed)?;
    if !root.is_dir() {
        return Err(walk_failed(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", dir.display()),
        )));
    }

    let mut inventory = Inventory::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            let kind = e.io_error().map_or(io::ErrorKind::Other, |io| io.kind());
            walk_failed(io::Error::new(kind, e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|e| walk_failed(io::Error::other(e)))?;
        let rel_path = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| walk_failed(io::Error::other(e)))?;

        inventory.insert(
            normalize_relative(rel_path),
            FileProperties {
                size: metadata.len(),
                mod_time: metadata.modified().map_err(walk_failed)?,
                name: entry.file_name().to_string_lossy().into_owned(),
            },
        );
    }

    Ok(inventory)
}

/// List every regular file under the remote `dir`.
///
/// A remote directory that does not exist (or cannot be probed) yields an
/// empty inventory rather than an error.
pub(crate) async fn remote_inventory(
    transport: &dyn Transport,
    cancel: &CancellationToken,
    dir: &str,
) -> Result<Inventory, Error> {
    let quoted = shell_quote(dir);
    match run_command(transport, cancel, &format!("test -d {quoted}")).await {
        Ok(_) => {}
        Err(Error::RemoteCommandFailed { .. }) => {
            tracing::debug!("remote directory {} does not exist", dir);
            return Ok(Inventory::new());
        }
        Err(e) => return Err(e),
    }

    // one line per file: path:size:mtime
    let cmd = format!("find {quoted} -type f -exec stat -c '%n:%s:%Y' {{}} \\;");
    let output = run_command(transport, cancel, &cmd).await?;

    let mut inventory = Inventory::new();
    for line in &output {
        let (rel_path, props) = parse_remote_line(dir, line)?;
        inventory.insert(rel_path, props);
    }
    Ok(inventory)
}

/// Parse one `path:size:epochSeconds` listing line.
///
/// The line is split from the right so paths containing `:` survive.
fn parse_remote_line(dir: &str, line: &str) -> Result<(String, FileProperties), Error> {
    let parse_failed = |reason: String| Error::ParseFailed {
        line: line.to_string(),
        reason,
    };

    let mut parts = line.rsplitn(3, ':');
    let (Some(mtime), Some(size), Some(full_path)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(parse_failed("expected path:size:mtime".to_string()));
    };

    let size: u64 = size
        .parse()
        .map_err(|e| parse_failed(format!("invalid size {size:?}: {e}")))?;
    let mtime: i64 = mtime
        .parse()
        .map_err(|e| parse_failed(format!("invalid modification time {mtime:?}: {e}")))?;
    let rel_path = remote_relative(dir, full_path)
        .ok_or_else(|| parse_failed(format!("{full_path} is not inside {dir}")))?;

    let name = full_path.rsplit('/').next().unwrap_or(full_path).to_string();
    Ok((
        rel_path,
        FileProperties {
            size,
            mod_time: from_unix_seconds(mtime),
            name,
        },
    ))
}

/// Path of `full_path` relative to the remote `dir`.
fn remote_relative(dir: &str, full_path: &str) -> Option<String> {
    let base = dir.trim_end_matches('/');
    let rest = if base.is_empty() {
        // dir was "/" (or made only of slashes)
        full_path.strip_prefix('/')?
    } else {
        full_path.strip_prefix(base)?.strip_prefix('/')?
    };
    let rel = rest
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");
    (!rel.is_empty()).then_some(rel)
}

/// Join path components with `/` whatever the platform separator is.
fn normalize_relative(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn from_unix_seconds(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
