// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0


use crate::db::Database;
use crate::storage::{DirEntry, MemoryStorage, Metadata, Storage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Person {
    pub f_name: String,
    pub l_name: String,
    pub age: u32,
}

pub(crate) fn person(first: &str, last: &str, age: u32) -> Person {
    Person {
        f_name: first.to_string(),
        l_name: last.to_string(),
        age,
    }
}

pub(crate) async fn memory_db() -> (Database, MemoryStorage) {
    let storage = MemoryStorage::new();
    let db = Database::with_storage(Arc::new(storage.clone()))
        .await
        .expect("Failed to open memory database");
    (db, storage)
}

pub(crate) async fn host_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(dir.path())
        .await
        .expect("Failed to open host database");
    (db, dir)
}

/// Memory storage whose mutating calls can be switched to fail
#[derive(Default)]
pub(crate) struct FlakyStorage {
    pub inner: MemoryStorage,
    failing: AtomicBool,
    failing_ops: Mutex<HashSet<&'static str>>,
}

impl FlakyStorage {
    pub fn failing() -> Self {
        let storage = Self::default();
        storage.set_failing(true);
        storage
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only the named operations
    pub fn fail_on(&self, ops: &[&'static str]) {
        let mut failing_ops = self.failing_ops.lock().expect("poisoned");
        failing_ops.clear();
        failing_ops.extend(ops);
    }

    fn check(&self, op: &'static str) -> io::Result<()> {
        let listed = self.failing_ops.lock().expect("poisoned").contains(op);
        if listed || self.failing.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "remote went away"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    fn name(&self) -> String {
        "flaky".to_string()
    }

    async fn metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.inner.metadata(path).await
    }

    async fn symlink_metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.inner.symlink_metadata(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.inner.list(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.check("write")?;
        self.inner.write(path, data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check("rename")?;
        self.inner.rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.check("remove_file")?;
        self.inner.remove_file(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check("remove_dir_all")?;
        self.inner.remove_dir_all(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check("create_dir_all")?;
        self.inner.create_dir_all(path).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.check("symlink")?;
        self.inner.symlink(target, link).await
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> io::Result<()> {
        self.check("set_readonly")?;
        self.inner.set_readonly(path, readonly).await
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        self.check("set_modified")?;
        self.inner.set_modified(path, modified).await
    }
}
