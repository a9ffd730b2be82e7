// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use super::{not_found, relative_components, DirEntry, EntryKind, Metadata, Storage};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

const SYMLINK_LOOP_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
enum Entry {
    File {
        content: Vec<u8>,
        readonly: bool,
        modified: SystemTime,
    },
    Directory {
        readonly: bool,
        modified: SystemTime,
    },
    /// Target is root-relative
    Symlink { target: PathBuf },
}

impl Entry {
    fn directory() -> Self {
        Entry::Directory {
            readonly: false,
            modified: SystemTime::now(),
        }
    }

    fn kind(&self) -> EntryKind {
        match self {
            Entry::File { .. } => EntryKind::File,
            Entry::Directory { .. } => EntryKind::Directory,
            Entry::Symlink { .. } => EntryKind::Symlink,
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            Entry::File {
                content,
                readonly,
                modified,
            } => Metadata {
                kind: EntryKind::File,
                len: content.len() as u64,
                readonly: *readonly,
                modified: Some(*modified),
            },
            Entry::Directory { readonly, modified } => Metadata {
                kind: EntryKind::Directory,
                len: 0,
                readonly: *readonly,
                modified: Some(*modified),
            },
            Entry::Symlink { .. } => Metadata {
                kind: EntryKind::Symlink,
                len: 0,
                readonly: false,
                modified: None,
            },
        }
    }
}

/// In-memory storage for tests and scratch databases.
///
/// Cloning shares the underlying tree.
#[derive(Clone)]
pub struct MemoryStorage(Arc<Mutex<State>>);

struct State {
    // Keyed by root-relative path; the root itself is the empty path
    entries: BTreeMap<PathBuf, Entry>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            entries: BTreeMap::from([(PathBuf::new(), Entry::directory())]),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(State::default())))
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries below the root (files, directories and links)
    pub async fn entry_count(&self) -> usize {
        self.0.lock().await.entries.len() - 1
    }
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotADirectory,
        format!("not a directory: {}", path.display()),
    )
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::IsADirectory,
        format!("is a directory: {}", path.display()),
    )
}

fn absent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

impl State {
    /// Resolve `path` to the key of the entry it names, following links in
    /// every component (and in the last one when `follow_last` is set).
    /// The returned key may not exist; its parent always does.
    fn resolve(&self, path: &Path, follow_last: bool, depth: u32) -> io::Result<PathBuf> {
        if depth > SYMLINK_LOOP_LIMIT {
            return Err(io::Error::other(format!(
                "too many levels of symbolic links: {}",
                path.display()
            )));
        }
        let parts = relative_components(path)?;
        let mut current = PathBuf::new();
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            let next = current.join(part);
            match self.entries.get(&next) {
                Some(Entry::Symlink { target }) if follow_last || !last => {
                    current = self.resolve(target, true, depth + 1)?;
                }
                Some(Entry::File { .. }) if !last => return Err(not_a_directory(&next)),
                None if !last => return Err(not_found(&next)),
                _ => current = next,
            }
        }
        Ok(current)
    }

    fn lookup(&self, path: &Path, follow_last: bool) -> io::Result<Option<Metadata>> {
        match self.resolve(path, follow_last, 0) {
            Ok(key) => Ok(self.entries.get(&key).map(Entry::metadata)),
            Err(e) if absent(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Key for a new entry at `path`; its parent must be a directory.
    fn place(&self, path: &Path, follow_last: bool) -> io::Result<PathBuf> {
        let key = self.resolve(path, follow_last, 0)?;
        let parent = key.parent().ok_or_else(|| is_a_directory(path))?;
        match self.entries.get(parent) {
            Some(Entry::Directory { .. }) => Ok(key),
            Some(_) => Err(not_a_directory(parent)),
            None => Err(not_found(parent)),
        }
    }

    fn subtree(&self, key: &Path) -> Vec<PathBuf> {
        self.entries
            .keys()
            .filter(|k| k.starts_with(key) && (!key.as_os_str().is_empty() || !k.as_os_str().is_empty()))
            .cloned()
            .collect()
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        let key = self.place(path, true)?;
        match self.entries.get(&key) {
            Some(Entry::Directory { .. }) => return Err(is_a_directory(path)),
            Some(Entry::File { readonly: true, .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("read-only file: {}", path.display()),
                ));
            }
            _ => {}
        }
        let _ = self.entries.insert(
            key,
            Entry::File {
                content: data.to_vec(),
                readonly: false,
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        let from_key = self.resolve(from, false, 0)?;
        let moving = self.entries.get(&from_key).ok_or_else(|| not_found(from))?.kind();
        if from_key.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot rename the storage root",
            ));
        }
        let to_key = self.place(to, false)?;
        if from_key == to_key {
            return Ok(());
        }
        if to_key.starts_with(&from_key) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot move {} into itself", from.display()),
            ));
        }
        match (moving, self.entries.get(&to_key).map(Entry::kind)) {
            (_, None) => {}
            (EntryKind::Directory, Some(EntryKind::Directory)) => {
                if self.subtree(&to_key).len() > 1 {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("directory not empty: {}", to.display()),
                    ));
                }
            }
            (_, Some(EntryKind::Directory)) => return Err(is_a_directory(to)),
            (EntryKind::Directory, Some(_)) => return Err(not_a_directory(to)),
            _ => {}
        }
        for key in self.subtree(&to_key) {
            let _ = self.entries.remove(&key);
        }
        for key in self.subtree(&from_key) {
            if let Some(entry) = self.entries.remove(&key) {
                let suffix = key.strip_prefix(&from_key).unwrap_or(Path::new(""));
                let _ = self.entries.insert(to_key.join(suffix), entry);
            }
        }
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> io::Result<()> {
        let key = self.resolve(path, false, 0)?;
        match self.entries.get(&key) {
            Some(Entry::Directory { .. }) => Err(is_a_directory(path)),
            Some(_) => {
                let _ = self.entries.remove(&key);
                Ok(())
            }
            None => Err(not_found(path)),
        }
    }

    fn remove_dir_all(&mut self, path: &Path) -> io::Result<()> {
        let key = self.resolve(path, false, 0)?;
        match self.entries.get(&key) {
            Some(Entry::Symlink { .. }) => {
                let _ = self.entries.remove(&key);
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                for k in self.subtree(&key) {
                    let _ = self.entries.remove(&k);
                }
                let _ = self.entries.entry(PathBuf::new()).or_insert_with(Entry::directory);
                Ok(())
            }
            Some(Entry::File { .. }) => Err(not_a_directory(path)),
            None => Err(not_found(path)),
        }
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        let mut prefix = PathBuf::new();
        for part in relative_components(path)? {
            prefix.push(part);
            let key = self.resolve(&prefix, true, 0)?;
            match self.entries.get(&key) {
                Some(Entry::Directory { .. }) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("file exists: {}", prefix.display()),
                    ));
                }
                None => {
                    let _ = self.entries.insert(key, Entry::directory());
                }
            }
        }
        Ok(())
    }

    fn symlink(&mut self, target: &Path, link: &Path) -> io::Result<()> {
        let key = self.place(link, false)?;
        if self.entries.contains_key(&key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {}", link.display()),
            ));
        }
        let target: PathBuf = relative_components(target)?.into_iter().collect();
        let _ = self.entries.insert(key, Entry::Symlink { target });
        Ok(())
    }

    fn entry_mut(&mut self, path: &Path) -> io::Result<&mut Entry> {
        let key = self.resolve(path, true, 0)?;
        self.entries.get_mut(&key).ok_or_else(|| not_found(path))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> String {
        "memory".to_string()
    }

    async fn metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.0.lock().await.lookup(path, true)
    }

    async fn symlink_metadata(&self, path: &Path) -> io::Result<Option<Metadata>> {
        self.0.lock().await.lookup(path, false)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let state = self.0.lock().await;
        let key = state.resolve(path, true, 0)?;
        match state.entries.get(&key) {
            Some(Entry::File { content, .. }) => Ok(content.clone()),
            Some(_) => Err(is_a_directory(path)),
            None => Err(not_found(path)),
        }
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let state = self.0.lock().await;
        let key = state.resolve(path, true, 0)?;
        match state.entries.get(&key) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(not_a_directory(path)),
            None => return Err(not_found(path)),
        }
        let mut entries: Vec<DirEntry> = state
            .entries
            .iter()
            .filter(|(k, _)| k.parent() == Some(key.as_path()))
            .filter_map(|(k, entry)| {
                k.file_name().map(|name| DirEntry {
                    name: name.to_string_lossy().into_owned(),
                    kind: entry.kind(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.0.lock().await.write(path, data)
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.0.lock().await.rename(from, to)
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.0.lock().await.remove_file(path)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.0.lock().await.remove_dir_all(path)
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.0.lock().await.create_dir_all(path)
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.0.lock().await.symlink(target, link)
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> io::Result<()> {
        let mut state = self.0.lock().await;
        match state.entry_mut(path)? {
            Entry::File { readonly: flag, .. } | Entry::Directory { readonly: flag, .. } => {
                *flag = readonly;
                Ok(())
            }
            Entry::Symlink { .. } => Err(not_found(path)),
        }
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> io::Result<()> {
        let mut state = self.0.lock().await;
        match state.entry_mut(path)? {
            Entry::File { modified: time, .. } | Entry::Directory { modified: time, .. } => {
                *time = modified;
                Ok(())
            }
            Entry::Symlink { .. } => Err(not_found(path)),
        }
    }
}
