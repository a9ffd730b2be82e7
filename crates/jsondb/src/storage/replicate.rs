// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Replicate-on-write decorator
//!
//! `ReplicatingStorage` wraps a primary `base` and a secondary `layer`.
//! Every write-class call runs against the base first; only when the
//! base succeeds is the same call applied to the layer. Reads are
//! served by the base alone: the layer is a mirror, never a source.
//!
//! What happens when the layer fails depends on the policy:
//! - `BestEffort` -- the failure is logged and counted, the call succeeds
//! - `Strict` -- the call fails with a `ReplicaError`, after the base has
//!   already changed

use super::{DirEntry, Metadata, Storage};
use async_trait::async_trait;
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationPolicy {
    #[default]
    BestEffort,
    Strict,
}

/// Counters describing how well the layer keeps up with the base
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub mirrored: u64,
    pub failed: u64,
    pub last_failure: Option<String>,
}

/// The secondary store rejected a call the primary accepted
#[derive(Debug, thiserror::Error)]
#[error("replica '{layer}' failed to {op} {}: {source}", .path.display())]
pub struct ReplicaError {
    pub layer: String,
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ReplicaError {
    /// Find a replica failure carried inside an `io::Error`
    pub fn find(err: &io::Error) -> Option<&ReplicaError> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<ReplicaError>())
    }
}

pub struct ReplicatingStorage {
    base: Arc<dyn Storage>,
    layer: Arc<dyn Storage>,
    policy: ReplicationPolicy,
    stats: Mutex<ReplicationStats>,
}

impl ReplicatingStorage {
    pub fn new(base: Arc<dyn Storage>, layer: Arc<dyn Storage>, policy: ReplicationPolicy) -> Self {
        Self {
            base,
            layer,
            policy,
            stats: Mutex::new(ReplicationStats::default()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> ReplicationPolicy {
        self.policy
    }

    #[must_use]
    pub fn base(&self) -> &Arc<dyn Storage> {
        &self.base
    }

    #[must_use]
    pub fn layer(&self) -> &Arc<dyn Storage> {
        &self.layer
    }

    /// Snapshot of the replication counters
    #[must_use]
    pub fn stats(&self) -> ReplicationStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Account for the layer's outcome of a call the base already applied.
    fn mirrored(&self, op: &'static str, path: &Path, result: io::Result<()>) -> io::Result<()> {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(()) => {
                stats.mirrored += 1;
                Ok(())
            }
            Err(source) => {
                let failure = ReplicaError {
                    layer: self.layer.name(),
                    op,
                    path: path.to_path_buf(),
                    source,
                };
                let message = failure.to_string();
                warn!("Replication diverged: {message}", message: message);
                stats.failed += 1;
                stats.last_failure = Some(message);
                match self.policy {
                    ReplicationPolicy::BestEffort => Ok(()),
                    ReplicationPolicy::Strict => Err(io::Error::other(failure)),
                }
            }
        }
    }
}

#[async_trait]
impl Storage for ReplicatingStorage {
    fn name(&self) -> String {
        format!("replicate({} -> {})", self.base.name(), self.layer.name())
    }

    async fn metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.base.metadata(path).await
    }

    async fn symlink_metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.base.symlink_metadata(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.base.read(path).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.base.list(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.base.write(path, data).await?;
        let layer = self.layer.write(path, data).await;
        self.mirrored("write", path, layer)
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.base.rename(from, to).await?;
        let layer = self.layer.rename(from, to).await;
        self.mirrored("rename", from, layer)
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.base.remove_file(path).await?;
        let layer = self.layer.remove_file(path).await;
        self.mirrored("remove", path, layer)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.base.remove_dir_all(path).await?;
        let layer = self.layer.remove_dir_all(path).await;
        self.mirrored("remove_all", path, layer)
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.base.create_dir_all(path).await?;
        let layer = self.layer.create_dir_all(path).await;
        self.mirrored("mkdir", path, layer)
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.base.symlink(target, link).await?;
        let layer = self.layer.symlink(target, link).await;
        self.mirrored("link", link, layer)
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> io::Result<()> {
        self.base.set_readonly(path, readonly).await?;
        let layer = self.layer.set_readonly(path, readonly).await;
        self.mirrored("chmod", path, layer)
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        self.base.set_modified(path, modified).await?;
        let layer = self.layer.set_modified(path, modified).await;
        self.mirrored("chtimes", path, layer)
    }
}
