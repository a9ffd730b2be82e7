// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The record store
//!
//! Writers serialize on the lock table: `put` and `init_collection` on the
//! collection name, `delete` and `link` on `collection/resource`. Readers
//! take no lock; `put` writes a temporary sibling and renames it into
//! place, so a reader sees either the old record or the new one.

use crate::config::{DatabaseConfig, build_object_store};
use crate::error::{Error, Result};
use crate::idgen::{DEFAULT_ID_LEN, gen_id};
use crate::lock::LockTable;
use crate::path::{self, Form};
use crate::query::{self, Expected, FieldPath};
use crate::storage::{EntryKind, HostStorage, ObjectStoreStorage, ReplicatingStorage, ReplicationPolicy, Storage};
use diagnostics::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the directory under the data directory holding all collections
pub const DB_DIR: &str = "db";

pub struct Database {
    storage: Arc<dyn Storage>,
    locks: LockTable,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("storage", &self.storage.name())
            .field("locks", &self.locks.len())
            .finish()
    }
}

impl Database {
    /// Open (creating if needed) the database at `<data_dir>/db`.
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let root = data_dir.as_ref().join(DB_DIR);
        Self::with_storage(Arc::new(HostStorage::new(root))).await
    }

    /// Open the database at `<data_dir>/db`, mirroring every write to `layer`.
    pub async fn open_replicated<P: AsRef<Path>>(
        data_dir: P,
        layer: Arc<dyn Storage>,
        policy: ReplicationPolicy,
    ) -> Result<Self> {
        let base: Arc<dyn Storage> = Arc::new(HostStorage::new(data_dir.as_ref().join(DB_DIR)));
        Self::with_storage(Arc::new(ReplicatingStorage::new(base, layer, policy))).await
    }

    pub async fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        match &config.replication {
            None => Self::open(&config.data_dir).await,
            Some(replication) => {
                let (store, prefix) = build_object_store(&replication.remote).await?;
                let layer = Arc::new(ObjectStoreStorage::new(store, prefix));
                Self::open_replicated(&config.data_dir, layer, replication.policy).await
            }
        }
    }

    /// Use an existing storage backend; its root is created if absent.
    pub async fn with_storage(storage: Arc<dyn Storage>) -> Result<Self> {
        let root = Path::new("");
        let name = storage.name();
        let existing = storage
            .metadata(root)
            .await
            .map_err(|e| Error::io(root, e))?
            .is_some_and(|m| m.is_dir());
        if existing {
            info!("Using existing database at {name}", name: name);
        } else {
            info!("Creating database at {name}", name: name);
            storage
                .create_dir_all(root)
                .await
                .map_err(|e| Error::io(root, e))?;
        }
        Ok(Self {
            storage,
            locks: LockTable::new(),
        })
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Create the collection directory; idempotent.
    pub async fn init_collection(&self, collection: &str) -> Result<()> {
        let dir = path::collection_dir(collection)?;
        let _guard = self.locks.lock(collection).await;
        self.ensure_collection(&dir).await?;
        debug!("Initialized collection {collection}", collection: collection);
        Ok(())
    }

    /// Create a collection directory unless a record already owns its name.
    async fn ensure_collection(&self, dir: &Path) -> Result<()> {
        let exists = self
            .storage
            .metadata(dir)
            .await
            .map_err(|e| Error::io(dir, e))?
            .is_some_and(|m| m.is_dir());
        if exists {
            return Ok(());
        }
        let record = path::record_file(dir);
        let taken = self
            .storage
            .symlink_metadata(&record)
            .await
            .map_err(|e| Error::io(&record, e))?
            .is_some();
        if taken {
            return Err(Error::validation(format!(
                "collection '{}' clashes with record {}",
                dir.display(),
                record.display()
            )));
        }
        self.storage
            .create_dir_all(dir)
            .await
            .map_err(|e| Error::io(dir, e))
    }

    /// Write `value` as `<collection>/<resource>.json`, replacing any
    /// previous record. An empty `resource` gets a generated name.
    ///
    /// Returns the resource name used.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        resource: &str,
        value: &T,
    ) -> Result<String> {
        let dir = path::collection_dir(collection)?;
        let resource = if resource.is_empty() {
            gen_id(DEFAULT_ID_LEN)
        } else {
            path::validate_resource(resource)?;
            resource.to_string()
        };
        let base = dir.join(&resource);
        let record = path::record_file(&base);
        let bytes = serde_json::to_vec(value).map_err(|source| Error::Serialization {
            path: record.clone(),
            source,
        })?;
        let temp = path::temp_file(&record);

        let _guard = self.locks.lock(collection).await;
        self.ensure_collection(&dir).await?;
        let holds_collection = self
            .storage
            .metadata(&base)
            .await
            .map_err(|e| Error::io(&base, e))?
            .is_some_and(|m| m.is_dir());
        if holds_collection {
            return Err(Error::NotARecord(base));
        }
        self.storage
            .write(&temp, &bytes)
            .await
            .map_err(|e| Error::io(&temp, e))?;
        if let Err(e) = self.storage.rename(&temp, &record).await {
            if let Err(cleanup) = self.storage.remove_file(&temp).await {
                let temp_str = temp.display().to_string();
                let cleanup_str = cleanup.to_string();
                debug!(
                    "Left stale {temp_str} behind: {cleanup_str}",
                    temp_str: temp_str,
                    cleanup_str: cleanup_str
                );
            }
            return Err(Error::io(&record, e));
        }

        let len = bytes.len();
        debug!(
            "Put {collection}/{resource} ({len} bytes)",
            collection: collection,
            resource: resource,
            len: len
        );
        Ok(resource)
    }

    /// Read and decode one record.
    pub async fn get<T: DeserializeOwned>(&self, collection: &str, resource: &str) -> Result<T> {
        let (path, bytes) = self.read_record(collection, resource).await?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Deserialization { path, source })
    }

    /// Read one record's raw JSON bytes.
    pub async fn get_bytes(&self, collection: &str, resource: &str) -> Result<Vec<u8>> {
        let (_, bytes) = self.read_record(collection, resource).await?;
        Ok(bytes)
    }

    async fn read_record(&self, collection: &str, resource: &str) -> Result<(PathBuf, Vec<u8>)> {
        path::validate_collection(collection)?;
        path::validate_resource(resource)?;
        let base = path::entry_base(collection, resource)?;
        let resolved = path::resolve(self.storage.as_ref(), &base, true)
            .await
            .map_err(|e| Error::io(&base, e))?
            .ok_or_else(|| Error::not_found(&base))?;
        if resolved.form == Form::Collection {
            return Err(Error::NotARecord(base));
        }
        match self.storage.read(&resolved.path).await {
            Ok(bytes) => Ok((resolved.path, bytes)),
            // Removed between resolve and read
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::not_found(&base)),
            Err(e) => Err(Error::io(&resolved.path, e)),
        }
    }

    /// Every record of a collection, in name order.
    pub async fn get_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        self.scan(collection, None, |_, _| Ok(true)).await
    }

    /// Records whose `field` equals `expected`, at most `limit` of them.
    pub async fn get_where<T, E>(
        &self,
        collection: &str,
        field: &str,
        expected: E,
        limit: Option<usize>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        E: Into<Expected>,
    {
        let field = FieldPath::parse(field)?;
        let expected = expected.into();
        self.scan(collection, limit, |path, doc| {
            query::matches(doc, &field, &expected).map_err(|e| Error::field(path, field.as_str(), e))
        })
        .await
    }

    /// Records whose `field` does not equal `expected`, at most `limit` of them.
    pub async fn get_where_not<T, E>(
        &self,
        collection: &str,
        field: &str,
        expected: E,
        limit: Option<usize>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        E: Into<Expected>,
    {
        let field = FieldPath::parse(field)?;
        let expected = expected.into();
        self.scan(collection, limit, |path, doc| {
            query::matches(doc, &field, &expected)
                .map(|matched| !matched)
                .map_err(|e| Error::field(path, field.as_str(), e))
        })
        .await
    }

    /// Decode the records of a collection that `keep` accepts.
    ///
    /// The first record that cannot be decoded or tested aborts the scan.
    async fn scan<T, F>(&self, collection: &str, limit: Option<usize>, keep: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&Path, &Value) -> Result<bool>,
    {
        let dir = path::collection_dir(collection)?;
        let is_dir = self
            .storage
            .metadata(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?
            .is_some_and(|m| m.is_dir());
        if !is_dir {
            return Err(Error::not_found(&dir));
        }

        let entries = match self.storage.list(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                // An unreadable collection holds no records
                let err_str = e.to_string();
                debug!(
                    "Listing {collection} failed, treating as empty: {err_str}",
                    collection: collection,
                    err_str: err_str
                );
                Vec::new()
            }
        };

        let mut records = Vec::new();
        let mut scanned = 0usize;
        for entry in entries {
            if limit.is_some_and(|n| records.len() >= n) {
                break;
            }
            if path::resource_of(&entry.name).is_none() {
                continue;
            }
            let file = dir.join(&entry.name);
            let Some(bytes) = self.read_listed(&file).await? else {
                continue;
            };
            scanned += 1;

            let doc: Value = serde_json::from_slice(&bytes).map_err(|source| {
                let file_str = file.display().to_string();
                error!("Malformed record {file_str}", file_str: file_str);
                Error::Deserialization {
                    path: file.clone(),
                    source,
                }
            })?;
            if keep(&file, &doc)? {
                let record = serde_json::from_value(doc).map_err(|source| Error::Deserialization {
                    path: file.clone(),
                    source,
                })?;
                records.push(record);
            }
        }

        let found = records.len();
        debug!(
            "Scanned {collection}: {found} of {scanned} records",
            collection: collection,
            found: found,
            scanned: scanned
        );
        Ok(records)
    }

    /// Bytes of a listed record file, or `None` if it vanished, dangles or
    /// is not a regular file.
    async fn read_listed(&self, file: &Path) -> Result<Option<Vec<u8>>> {
        match self.storage.metadata(file).await {
            Ok(Some(m)) if m.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) => return Err(Error::io(file, e)),
        }
        match self.storage.read(file).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(file, e)),
        }
    }

    /// Remove a record, or with an empty `resource` a whole collection.
    ///
    /// Links are removed themselves, never their targets.
    pub async fn delete(&self, collection: &str, resource: &str) -> Result<()> {
        let base = path::entry_base(collection, resource)?;
        let key = path::entry_key(collection, resource);
        let _guard = self.locks.lock(&key).await;

        let resolved = path::resolve(self.storage.as_ref(), &base, false)
            .await
            .map_err(|e| Error::io(&base, e))?
            .ok_or_else(|| Error::not_found(&base))?;
        let result = match resolved.metadata.kind {
            EntryKind::Directory => self.storage.remove_dir_all(&resolved.path).await,
            EntryKind::File | EntryKind::Symlink => self.storage.remove_file(&resolved.path).await,
            EntryKind::Other => return Err(Error::Unsupported(resolved.path)),
        };
        result.map_err(|e| Error::io(&resolved.path, e))?;
        debug!("Deleted {key}", key: key);
        Ok(())
    }

    /// Make `dest` an alias of `src`: a record links to a record, a
    /// collection (empty resources) to a collection.
    ///
    /// The alias dangles once the source is deleted.
    pub async fn link(
        &self,
        src_collection: &str,
        src_resource: &str,
        dest_collection: &str,
        dest_resource: &str,
    ) -> Result<()> {
        let src = path::entry_base(src_collection, src_resource)?;
        let dest = path::entry_base(dest_collection, dest_resource)?;
        if src_resource.is_empty() != dest_resource.is_empty() {
            return Err(Error::validation(
                "link needs two records or two collections",
            ));
        }
        if src == dest {
            return Err(Error::validation(format!(
                "cannot link {} to itself",
                src.display()
            )));
        }
        if src_resource.is_empty() && dest.starts_with(&src) {
            return Err(Error::validation(format!(
                "cannot link {} inside itself",
                src.display()
            )));
        }
        let key = path::entry_key(src_collection, src_resource);
        let _guard = self.locks.lock(&key).await;

        let resolved = path::resolve(self.storage.as_ref(), &src, true)
            .await
            .map_err(|e| Error::io(&src, e))?
            .ok_or_else(|| Error::not_found(&src))?;

        if let Some(parent) = dest.parent() {
            self.storage
                .create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }

        let dest_key = path::entry_key(dest_collection, dest_resource);
        match resolved.form {
            Form::Collection => {
                self.storage
                    .symlink(&src, &dest)
                    .await
                    .map_err(|e| Error::io(&dest, e))?;
            }
            Form::Record => {
                let target = path::record_file(&dest);
                match self.storage.remove_file(&target).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::io(&target, e)),
                }
                self.storage
                    .symlink(&resolved.path, &target)
                    .await
                    .map_err(|e| Error::io(&target, e))?;
            }
        }
        debug!("Linked {key} as {dest_key}", key: key, dest_key: dest_key);
        Ok(())
    }
}
