// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Mapping of (collection, resource) onto storage paths
//!
//! A collection is a directory, a record is `<collection>/<resource>.json`.
//! Existence checks try the bare `<collection>/<resource>` path first and
//! accept it only as a directory (a nested collection, or a link to one);
//! otherwise the `.json` file is the candidate. The two forms never both
//! count for the same name.

use crate::error::{Error, Result};
use crate::storage::{Metadata, Storage};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

pub const RECORD_SUFFIX: &str = ".json";
pub const TEMP_SUFFIX: &str = ".tmp";

fn check_segment(kind: &str, segment: &str, whole: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::validation(format!("{kind} '{whole}' has an empty segment")));
    }
    if segment == "." || segment == ".." {
        return Err(Error::validation(format!("{kind} '{whole}' may not contain '{segment}'")));
    }
    if segment.contains(['\\', '\0']) {
        return Err(Error::validation(format!("{kind} '{whole}' contains an invalid character")));
    }
    Ok(())
}

/// Validate a collection name; `/` separates nested collections.
pub fn validate_collection(collection: &str) -> Result<()> {
    if collection.is_empty() {
        return Err(Error::validation("missing collection - no place to save record"));
    }
    for segment in collection.split('/') {
        check_segment("collection", segment, collection)?;
    }
    Ok(())
}

/// Validate a resource name: exactly one path segment.
pub fn validate_resource(resource: &str) -> Result<()> {
    if resource.is_empty() {
        return Err(Error::validation("missing resource - record has no name"));
    }
    if resource.contains('/') {
        return Err(Error::validation(format!("resource '{resource}' may not contain '/'")));
    }
    check_segment("resource", resource, resource)
}

pub fn collection_dir(collection: &str) -> Result<PathBuf> {
    validate_collection(collection)?;
    Ok(PathBuf::from(collection))
}

/// `<collection>/<resource>`, or the collection itself for an empty resource
pub fn entry_base(collection: &str, resource: &str) -> Result<PathBuf> {
    let mut base = collection_dir(collection)?;
    if !resource.is_empty() {
        validate_resource(resource)?;
        base.push(resource);
    }
    Ok(base)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<base>.json`; the resource may itself contain dots
#[must_use]
pub fn record_file(base: &Path) -> PathBuf {
    with_suffix(base, RECORD_SUFFIX)
}

/// Sibling the new content is written to before the rename
#[must_use]
pub fn temp_file(record: &Path) -> PathBuf {
    with_suffix(record, TEMP_SUFFIX)
}

/// Resource name for a listed file name, if it names a record
#[must_use]
pub fn resource_of(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(RECORD_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

/// Lock key for operations scoped to a single entry
#[must_use]
pub fn entry_key(collection: &str, resource: &str) -> String {
    if resource.is_empty() {
        collection.to_string()
    } else {
        format!("{collection}/{resource}")
    }
}

/// Which of the two candidate forms a name resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// The bare path: a collection directory, or a link to one
    Collection,
    /// The `.json`-suffixed path
    Record,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub path: PathBuf,
    pub form: Form,
    pub metadata: Metadata,
}

/// Resolve a base path to the entry it names.
///
/// With `follow` set, links are followed (a dangling link is absent);
/// otherwise the entries themselves are classified.
pub async fn resolve(storage: &dyn Storage, base: &Path, follow: bool) -> io::Result<Option<Resolved>> {
    let stat = move |path: PathBuf| async move {
        let metadata = if follow {
            storage.metadata(&path).await?
        } else {
            storage.symlink_metadata(&path).await?
        };
        Ok::<_, io::Error>(metadata.map(|m| (path, m)))
    };

    if let Some((path, metadata)) = stat(base.to_path_buf()).await? {
        if metadata.is_dir() || (!follow && metadata.is_symlink()) {
            return Ok(Some(Resolved {
                path,
                form: Form::Collection,
                metadata,
            }));
        }
    }
    Ok(stat(record_file(base)).await?.map(|(path, metadata)| Resolved {
        path,
        form: Form::Record,
        metadata,
    }))
}
