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

//! One-way reconciliation of a local tree onto a remote directory.
//!
//! The local side is authoritative and sync is additive: remote-only files
//! are left alone, nothing is deleted and partial progress is never rolled
//! back.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use super::error::Error;
use super::inventory::{local_inventory, remote_inventory, Inventory};
use super::transfer::upload;
use super::transport::Transport;

/// Maximum modification time skew still treated as the same file. Remote
/// listings only carry whole seconds.
pub const MOD_TIME_TOLERANCE: Duration = Duration::from_secs(1);

/// Local paths that are missing remotely or differ in size, or in
/// modification time by more than [`MOD_TIME_TOLERANCE`]. Sorted.
pub fn find_unmatched(local: &Inventory, remote: &Inventory) -> Vec<String> {
    let mut unmatched: Vec<String> = local
        .iter()
        .filter(|(path, local_props)| match remote.get(path.as_str()) {
            None => true,
            Some(remote_props) => {
                local_props.size != remote_props.size
                    || time_distance(local_props.mod_time, remote_props.mod_time)
                        > MOD_TIME_TOLERANCE
            }
        })
        .map(|(path, _)| path.clone())
        .collect();
    unmatched.sort();
    unmatched
}

/// Upload every unmatched file under `local_dir` to `remote_dir`.
///
/// Returns the uploaded relative paths in sorted order. The first failed
/// upload stops the sync.
pub(crate) async fn sync(
    transport: &dyn Transport,
    cancel: &CancellationToken,
    local_dir: &Path,
    remote_dir: &str,
) -> Result<Vec<String>, Error> {
    let walk_dir = local_dir.to_path_buf();
    let local = tokio::task::spawn_blocking(move || local_inventory(&walk_dir))
        .await
        .unwrap_or_else(|join_err| {
            Err(Error::WalkFailed {
                dir: local_dir.to_path_buf(),
                source: std::io::Error::other(join_err),
            })
        })
        .map_err(|source| Error::LocalInventoryFailed {
            dir: local_dir.to_path_buf(),
            source: Box::new(source),
        })?;

    let remote = remote_inventory(transport, cancel, remote_dir)
        .await
        .map_err(|source| Error::RemoteInventoryFailed {
            dir: remote_dir.to_string(),
            source: Box::new(source),
        })?;

    let unmatched = find_unmatched(&local, &remote);
    tracing::debug!(
        "{} of {} local files need sync to {}",
        unmatched.len(),
        local.len(),
        remote_dir
    );

    for rel_path in &unmatched {
        let local_path = local_join(local_dir, rel_path);
        let remote_path = remote_join(remote_dir, rel_path);
        upload(transport, cancel, &local_path, &remote_path, true)
            .await
            .map_err(|source| Error::UploadFailed {
                local: local_path.clone(),
                remote: remote_path.clone(),
                source: Box::new(source),
            })?;
        tracing::info!("synced {} to {}", local_path.display(), remote_path);
    }

    Ok(unmatched)
}

fn time_distance(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b)
        .unwrap_or_else(|earlier| earlier.duration())
}

fn local_join(dir: &Path, rel_path: &str) -> PathBuf {
    rel_path.split('/').fold(dir.to_path_buf(), |acc, part| acc.join(part))
}

fn remote_join(dir: &str, rel_path: &str) -> String {
    match dir.trim_end_matches('/') {
        "" if dir.starts_with('/') => format!("/{rel_path}"),
        "" => rel_path.to_string(),
        base => format!("{base}/{rel_path}"),
    }
}
