// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! jsondb - a JSON document store on a plain directory tree
//!
//! Each collection is a directory and each record a JSON file,
//! `<data_dir>/db/<collection>/<resource>.json`. Writes are atomic
//! (temporary file plus rename) and serialized per collection; queries
//! are linear scans with dotted-path equality.
//!
//! Logging goes through the `diagnostics` crate; set JSONDB_LOG and call
//! `diagnostics::init()` in the binary:
//! - JSONDB_LOG=off (default) - silent
//! - JSONDB_LOG=info - database open
//! - JSONDB_LOG=debug - every write and scan

// Database configuration and replica construction
pub mod config;

/// The record store
pub mod db;

// Error types
pub mod error;

/// Record identifiers
pub mod idgen;

/// Per-key mutual exclusion
pub mod lock;

/// Collection and record paths
pub mod path;

/// Dotted-path field equality
pub mod query;

/// Storage backends
pub mod storage;

pub use config::{DatabaseConfig, RemoteConfig, ReplicationConfig, build_object_store, data_dir_with_override};
pub use db::Database;
pub use error::{Error, Result};
pub use idgen::{DEFAULT_ID_LEN, gen_id, gen_id_from_seed};
pub use query::Expected;
pub use storage::{
    HostStorage, MemoryStorage, ObjectStoreStorage, ReplicatingStorage, ReplicationPolicy, ReplicationStats, Storage,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests;
