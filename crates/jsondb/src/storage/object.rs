// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::{relative_components, DirEntry, EntryKind, Metadata, Storage};
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// `object_store` bucket presented as `Storage`, for use as a replica.
///
/// Object stores have no directories, links or mutable attributes:
/// - directories are implicit key prefixes, so `create_dir_all` is a no-op
/// - `symlink` copies the target object (or every object under a target
///   prefix) to the link location
/// - `set_readonly` and `set_modified` are no-ops
pub struct ObjectStoreStorage {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl ObjectStoreStorage {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: ObjectPath) -> Self {
        Self { store, prefix }
    }

    fn location(&self, path: &Path) -> io::Result<ObjectPath> {
        let mut location = self.prefix.clone();
        for part in relative_components(path)? {
            location = location.child(part);
        }
        Ok(location)
    }

    async fn objects_under(&self, location: &ObjectPath) -> io::Result<Vec<ObjectPath>> {
        let metas: Vec<_> = self
            .store
            .list(Some(location))
            .try_collect::<Vec<_>>()
            .await
            .map_err(into_io)?;
        Ok(metas.into_iter().map(|m| m.location).collect())
    }

    async fn is_prefix(&self, location: &ObjectPath) -> io::Result<bool> {
        let listing = self
            .store
            .list_with_delimiter(Some(location))
            .await
            .map_err(into_io)?;
        Ok(!listing.objects.is_empty() || !listing.common_prefixes.is_empty())
    }

    /// Re-root `location` from under `from` to under `to`.
    fn rebase(location: &ObjectPath, from: &ObjectPath, to: &ObjectPath) -> ObjectPath {
        match location.prefix_match(from) {
            Some(rest) => rest.fold(to.clone(), |acc, part| acc.child(part)),
            None => to.clone(),
        }
    }
}

fn into_io(e: object_store::Error) -> io::Error {
    match e {
        object_store::Error::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, e),
        other => io::Error::other(other),
    }
}

fn directory_metadata() -> Metadata {
    Metadata {
        kind: EntryKind::Directory,
        len: 0,
        readonly: false,
        modified: None,
    }
}

#[async_trait]
impl Storage for ObjectStoreStorage {
    fn name(&self) -> String {
        format!("object_store:{}/{}", self.store, self.prefix)
    }

    async fn metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        let location = self.location(path)?;
        if relative_components(path)?.is_empty() {
            return Ok(Some(directory_metadata()));
        }
        match self.store.head(&location).await {
            Ok(meta) => {
                let modified: SystemTime = meta.last_modified.into();
                return Ok(Some(Metadata {
                    kind: EntryKind::File,
                    len: meta.size as u64,
                    readonly: false,
                    modified: Some(modified),
                }));
            }
            Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(into_io(e)),
        }
        if self.is_prefix(&location).await? {
            Ok(Some(directory_metadata()))
        } else {
            Ok(None)
        }
    }

    async fn symlink_metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.metadata(path).await
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let location = self.location(path)?;
        let result = self.store.get(&location).await.map_err(into_io)?;
        let bytes = result.bytes().await.map_err(into_io)?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let location = self.location(path)?;
        let listing = self
            .store
            .list_with_delimiter(Some(&location))
            .await
            .map_err(into_io)?;
        let mut entries: Vec<DirEntry> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename())
            .map(|name| DirEntry {
                name: name.to_string(),
                kind: EntryKind::Directory,
            })
            .chain(
                listing
                    .objects
                    .iter()
                    .filter_map(|m| m.location.filename())
                    .map(|name| DirEntry {
                        name: name.to_string(),
                        kind: EntryKind::File,
                    }),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let location = self.location(path)?;
        let _ = self
            .store
            .put(&location, PutPayload::from(data.to_vec()))
            .await
            .map_err(into_io)?;
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from = self.location(from)?;
        let to = self.location(to)?;
        self.store.rename(&from, &to).await.map_err(into_io)
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let location = self.location(path)?;
        self.store.delete(&location).await.map_err(into_io)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let location = self.location(path)?;
        for object in self.objects_under(&location).await? {
            self.store.delete(&object).await.map_err(into_io)?;
        }
        Ok(())
    }

    async fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let from = self.location(target)?;
        let to = self.location(link)?;
        match self.store.copy(&from, &to).await {
            Ok(()) => return Ok(()),
            Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(into_io(e)),
        }
        let objects = self.objects_under(&from).await?;
        if objects.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("link target not found: {}", target.display()),
            ));
        }
        for object in objects {
            let dest = Self::rebase(&object, &from, &to);
            self.store.copy(&object, &dest).await.map_err(into_io)?;
        }
        Ok(())
    }

    async fn set_readonly(&self, _path: &Path, _readonly: bool) -> io::Result<()> {
        Ok(())
    }

    async fn set_modified(&self, _path: &Path, _modified: SystemTime) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn storage() -> ObjectStoreStorage {
        ObjectStoreStorage::new(Arc::new(InMemory::new()), ObjectPath::from("replica"))
    }

    #[tokio::test]
    async fn test_write_read_metadata() {
        let storage = storage();
        storage.write(Path::new("people/a.json"), b"{}").await.unwrap();
        assert_eq!(storage.read(Path::new("people/a.json")).await.unwrap(), b"{}");

        let file = storage.metadata(Path::new("people/a.json")).await.unwrap().unwrap();
        assert!(file.is_file());
        assert_eq!(file.len, 2);
        let dir = storage.metadata(Path::new("people")).await.unwrap().unwrap();
        assert!(dir.is_dir());
        assert!(storage.metadata(Path::new("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_remove_dir_all() {
        let storage = storage();
        storage.write(Path::new("people/b.json"), b"b").await.unwrap();
        storage.write(Path::new("people/a.json"), b"a").await.unwrap();
        storage.write(Path::new("people/sub/c.json"), b"c").await.unwrap();

        let names: Vec<_> = storage
            .list(Path::new("people"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.json", "b.json", "sub"]);

        storage.remove_dir_all(Path::new("people")).await.unwrap();
        assert!(storage.metadata(Path::new("people")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_and_remove() {
        let storage = storage();
        storage.write(Path::new("people/a.json.tmp"), b"a").await.unwrap();
        storage
            .rename(Path::new("people/a.json.tmp"), Path::new("people/a.json"))
            .await
            .unwrap();
        assert!(storage.metadata(Path::new("people/a.json.tmp")).await.unwrap().is_none());
        storage.remove_file(Path::new("people/a.json")).await.unwrap();
        assert!(storage.metadata(Path::new("people/a.json")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_symlink_copies_file_and_prefix() {
        let storage = storage();
        storage.write(Path::new("people/a.json"), b"a").await.unwrap();
        storage.write(Path::new("people/b.json"), b"b").await.unwrap();

        storage
            .symlink(Path::new("people/a.json"), Path::new("friends/a.json"))
            .await
            .unwrap();
        assert_eq!(storage.read(Path::new("friends/a.json")).await.unwrap(), b"a");

        storage.symlink(Path::new("people"), Path::new("folks")).await.unwrap();
        assert_eq!(storage.read(Path::new("folks/b.json")).await.unwrap(), b"b");

        let missing = storage.symlink(Path::new("nobody"), Path::new("x")).await;
        assert_eq!(missing.unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
