// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Per-key write serialization
//!
//! The table maps a key (a collection, or a `collection/resource`
//! composite) to one shared async mutex. Every lookup of the same key
//! returns a clone of the same `Arc`, so all holders contend on a single
//! primitive. The map's own lock is held only while finding or inserting
//! a handle, never while the caller's critical section runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Shared per-key mutual exclusion handle
pub type KeyLock = Arc<AsyncMutex<()>>;

/// Guard held for the duration of a mutating operation
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct LockTable {
    handles: Mutex<HashMap<String, KeyLock>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the handle for `key`.
    pub fn handle(&self, key: &str) -> KeyLock {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = handles.get(key) {
            return existing.clone();
        }
        let created = Arc::new(AsyncMutex::new(()));
        let _ = handles.insert(key.to_string(), created.clone());
        created
    }

    /// Acquire the lock for `key`, waiting behind current holders.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.handle(key).lock_owned().await
    }

    /// Number of distinct keys seen so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
