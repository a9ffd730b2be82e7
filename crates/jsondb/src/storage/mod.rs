// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Storage backends for the record store
//!
//! `Storage` is the filesystem contract the record store is written
//! against. Paths are relative to the backend's own root, so the same
//! relative path names the same entry on every backend; this is what
//! lets `ReplicatingStorage` mirror calls verbatim.
//!
//! - `HostStorage` -- a directory on the host, via `tokio::fs`
//! - `MemoryStorage` -- an in-process tree, for tests and scratch databases
//! - `ObjectStoreStorage` -- an `object_store` bucket, used as a replica
//! - `ReplicatingStorage` -- writes to two backends, reads from the first

mod host;
mod memory;
mod object;
mod replicate;

pub use host::HostStorage;
pub use memory::MemoryStorage;
pub use object::ObjectStoreStorage;
pub use replicate::{ReplicaError, ReplicatingStorage, ReplicationPolicy, ReplicationStats};

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    pub(crate) fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub kind: EntryKind,
    /// Content length for files, zero otherwise
    pub len: u64,
    pub readonly: bool,
    pub modified: Option<SystemTime>,
}

impl Metadata {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

/// One entry of a directory listing. `kind` does not follow links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Filesystem operations used by the record store.
///
/// `metadata` and `symlink_metadata` return `Ok(None)` for absent
/// entries; every other operation reports absence as an
/// `io::ErrorKind::NotFound` error.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short human-readable backend description, for logs
    fn name(&self) -> String;

    /// Metadata of the entry, following symbolic links
    async fn metadata(&self, path: &Path) -> io::Result<Option<Metadata>>;

    /// Metadata of the entry itself, never following a final link
    async fn symlink_metadata(&self, path: &Path) -> io::Result<Option<Metadata>>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Entries of a directory, sorted by name
    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Create or truncate a file with the given content
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file or a symbolic link
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it; a link is removed itself
    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create `link` pointing at `target`; both are root-relative
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    async fn set_readonly(&self, path: &Path, readonly: bool) -> io::Result<()>;

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()>;
}

/// Split a root-relative path into its normal components.
///
/// Absolute paths and `..` are rejected so a backend can never be
/// addressed outside its root.
pub(crate) fn relative_components(path: &Path) -> io::Result<Vec<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("path escapes storage root: {}", path.display()),
                ));
            }
        }
    }
    Ok(parts)
}

/// Path of `target` as seen from the directory containing `link`.
pub(crate) fn relative_link_target(target: &Path, link: &Path) -> io::Result<PathBuf> {
    let depth = relative_components(link)?.len().saturating_sub(1);
    let mut relative = PathBuf::new();
    for _ in 0..depth {
        relative.push("..");
    }
    for part in relative_components(target)? {
        relative.push(part);
    }
    Ok(relative)
}

pub(crate) fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_components() {
        assert_eq!(
            relative_components(Path::new("a/./b/c.json")).unwrap(),
            vec!["a", "b", "c.json"]
        );
        assert!(relative_components(Path::new("")).unwrap().is_empty());
        assert!(relative_components(Path::new("../a")).is_err());
        assert!(relative_components(Path::new("/a")).is_err());
    }

    #[test]
    fn test_relative_link_target() {
        assert_eq!(
            relative_link_target(Path::new("people/a.json"), Path::new("friends/b.json")).unwrap(),
            PathBuf::from("../people/a.json")
        );
        assert_eq!(
            relative_link_target(Path::new("people"), Path::new("folks")).unwrap(),
            PathBuf::from("people")
        );
        assert_eq!(
            relative_link_target(Path::new("a/b"), Path::new("c/d/e")).unwrap(),
            PathBuf::from("../../a/b")
        );
    }
}
