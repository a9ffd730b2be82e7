// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for record store operations

use crate::query::FieldError;
use crate::storage::ReplicaError;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a record (resolves to a collection): {}", .0.display())]
    NotARecord(PathBuf),

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error for {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Deserialization error for {}: {source}", .path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Field '{field}' in {}: {reason}", .path.display())]
    FieldAccess {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("Field '{field}' in {}: expected {expected}, found {found}", .path.display())]
    TypeMismatch {
        path: PathBuf,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unsupported entry type: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("Replication error on {}: {reason}", .path.display())]
    Replication { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl Error {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation(message.into())
    }

    pub fn not_found<P: AsRef<Path>>(path: P) -> Self {
        Error::NotFound(path.as_ref().to_path_buf())
    }

    /// Wrap a storage error with the path it concerned.
    ///
    /// Replica failures raised under a strict replication policy keep
    /// their own variant so callers can tell them from primary failures.
    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match ReplicaError::find(&source) {
            Some(replica) => Error::Replication {
                path,
                reason: replica.to_string(),
            },
            None => Error::Io { path, source },
        }
    }

    pub(crate) fn field<P: AsRef<Path>>(path: P, field: &str, err: FieldError) -> Self {
        let path = path.as_ref().to_path_buf();
        let field = field.to_string();
        match err {
            FieldError::TypeMismatch { expected, found } => Error::TypeMismatch {
                path,
                field,
                expected,
                found,
            },
            other => Error::FieldAccess {
                path,
                field,
                reason: other.to_string(),
            },
        }
    }

    /// True for the caller-visible "no such collection or record" case
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
