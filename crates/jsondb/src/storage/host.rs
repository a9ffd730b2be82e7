// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::{relative_components, relative_link_target, DirEntry, EntryKind, Metadata, Storage};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Host filesystem storage rooted at a directory.
///
/// The root is created by `create_dir_all("")`, which the database does
/// when it opens; constructing a `HostStorage` touches nothing on disk.
#[derive(Debug, Clone)]
pub struct HostStorage {
    root: PathBuf,
}

impl HostStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &Path) -> io::Result<PathBuf> {
        let mut host = self.root.clone();
        for part in relative_components(path)? {
            host.push(part);
        }
        Ok(host)
    }
}

fn convert(metadata: &std::fs::Metadata) -> Metadata {
    let kind = EntryKind::from_file_type(metadata.file_type());
    Metadata {
        kind,
        len: if kind == EntryKind::File { metadata.len() } else { 0 },
        readonly: metadata.permissions().readonly(),
        modified: metadata.modified().ok(),
    }
}

fn absent_as_none(result: io::Result<std::fs::Metadata>) -> io::Result<Option<Metadata>> {
    match result {
        Ok(metadata) => Ok(Some(convert(&metadata))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
async fn make_link(target: &Path, link: &Path, _target_is_dir: bool) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn make_link(target: &Path, link: &Path, target_is_dir: bool) -> io::Result<()> {
    if target_is_dir {
        tokio::fs::symlink_dir(target, link).await
    } else {
        tokio::fs::symlink_file(target, link).await
    }
}

#[async_trait]
impl Storage for HostStorage {
    fn name(&self) -> String {
        format!("host:{}", self.root.display())
    }

    async fn metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        absent_as_none(tokio::fs::metadata(self.host_path(path)?).await)
    }

    async fn symlink_metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        absent_as_none(tokio::fs::symlink_metadata(self.host_path(path)?).await)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.host_path(path)?).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut read_dir = tokio::fs::read_dir(self.host_path(path)?).await?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let kind = EntryKind::from_file_type(entry.file_type().await?);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        tokio::fs::write(self.host_path(path)?, data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(self.host_path(from)?, self.host_path(to)?).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(self.host_path(path)?).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let host = self.host_path(path)?;
        let metadata = tokio::fs::symlink_metadata(&host).await?;
        if metadata.file_type().is_symlink() {
            tokio::fs::remove_file(host).await
        } else {
            tokio::fs::remove_dir_all(host).await
        }
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(self.host_path(path)?).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let target_is_dir = tokio::fs::metadata(self.host_path(target)?)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let relative = relative_link_target(target, link)?;
        make_link(&relative, &self.host_path(link)?, target_is_dir).await
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> io::Result<()> {
        let host = self.host_path(path)?;
        let mut permissions = tokio::fs::metadata(&host).await?.permissions();
        permissions.set_readonly(readonly);
        tokio::fs::set_permissions(host, permissions).await
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        let host = self.host_path(path)?;
        tokio::task::spawn_blocking(move || std::fs::File::open(host)?.set_modified(modified))
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, HostStorage) {
        let dir = TempDir::new().expect("create temp dir");
        let storage = HostStorage::new(dir.path().join("db"));
        (dir, storage)
    }

    #[tokio::test]
    async fn test_root_created_on_demand() {
        let (dir, storage) = storage();
        assert!(storage.metadata(Path::new("")).await.unwrap().is_none());
        storage.create_dir_all(Path::new("")).await.unwrap();
        assert!(dir.path().join("db").is_dir());
        assert!(storage.metadata(Path::new("")).await.unwrap().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_write_read_list() {
        let (_dir, storage) = storage();
        storage.create_dir_all(Path::new("people")).await.unwrap();
        storage.write(Path::new("people/b.json"), b"{}").await.unwrap();
        storage.write(Path::new("people/a.json"), b"[]").await.unwrap();
        storage.create_dir_all(Path::new("people/sub")).await.unwrap();

        assert_eq!(storage.read(Path::new("people/a.json")).await.unwrap(), b"[]");
        let names: Vec<_> = storage
            .list(Path::new("people"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.json".to_string(), EntryKind::File),
                ("b.json".to_string(), EntryKind::File),
                ("sub".to_string(), EntryKind::Directory),
            ]
        );
    }

    #[tokio::test]
    async fn test_relative_symlink_survives_move() {
        let (dir, storage) = storage();
        storage.create_dir_all(Path::new("people")).await.unwrap();
        storage.create_dir_all(Path::new("friends")).await.unwrap();
        storage.write(Path::new("people/a.json"), b"1").await.unwrap();
        storage
            .symlink(Path::new("people/a.json"), Path::new("friends/a.json"))
            .await
            .unwrap();

        let moved = dir.path().join("moved");
        std::fs::rename(dir.path().join("db"), &moved).unwrap();
        let storage = HostStorage::new(moved);
        assert_eq!(storage.read(Path::new("friends/a.json")).await.unwrap(), b"1");
        let link = storage
            .symlink_metadata(Path::new("friends/a.json"))
            .await
            .unwrap()
            .unwrap();
        assert!(link.is_symlink());
    }

    #[tokio::test]
    async fn test_remove_dir_all_on_link_keeps_target() {
        let (_dir, storage) = storage();
        storage.create_dir_all(Path::new("people")).await.unwrap();
        storage.write(Path::new("people/a.json"), b"1").await.unwrap();
        storage.symlink(Path::new("people"), Path::new("folks")).await.unwrap();

        storage.remove_dir_all(Path::new("folks")).await.unwrap();
        assert!(storage.symlink_metadata(Path::new("folks")).await.unwrap().is_none());
        assert_eq!(storage.read(Path::new("people/a.json")).await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_attributes() {
        let (_dir, storage) = storage();
        storage.create_dir_all(Path::new("")).await.unwrap();
        storage.write(Path::new("a.json"), b"1").await.unwrap();

        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        storage.set_modified(Path::new("a.json"), when).await.unwrap();
        storage.set_readonly(Path::new("a.json"), true).await.unwrap();

        let meta = storage.metadata(Path::new("a.json")).await.unwrap().unwrap();
        assert_eq!(meta.modified, Some(when));
        assert!(meta.readonly);
        storage.set_readonly(Path::new("a.json"), false).await.unwrap();
    }

    #[tokio::test]
    async fn test_escaping_root_rejected() {
        let (_dir, storage) = storage();
        let err = storage.read(Path::new("../outside")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
