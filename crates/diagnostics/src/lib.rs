// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Logging for the jsondb crates
//!
//! Libraries only emit events; binaries decide whether anything is shown
//! by calling [`init`] once at startup.
//!
//! Usage:
//! - Set JSONDB_LOG=off (default) - no logs
//! - Set JSONDB_LOG=info - database open, collection lifecycle
//! - Set JSONDB_LOG=debug - every write, scan summaries, replication
//! - Set JSONDB_LOG=warn or JSONDB_LOG=error - problems only

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable controlling the minimum level
pub const LOG_ENV: &str = "JSONDB_LOG";

static INIT: Once = Once::new();

fn level_for(value: &str) -> Option<emit::Level> {
    match value {
        "debug" => Some(emit::Level::Debug),
        "info" => Some(emit::Level::Info),
        "warn" => Some(emit::Level::Warn),
        "error" => Some(emit::Level::Error),
        _ => None,
    }
}

/// Initialize diagnostics based on the JSONDB_LOG environment variable
///
/// Subsequent calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let requested = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());
        if requested == "off" {
            return;
        }

        let level = match level_for(&requested) {
            Some(level) => level,
            None => {
                // Bootstrap warning, emitted before any sink exists
                eprintln!("Warning: Unknown {LOG_ENV} value '{requested}', using 'info'");
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime lives for the rest of the process
        std::mem::forget(rt);
    });
}

/// Detailed diagnostics: individual writes, scan counts, resolved paths
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Normal operations: opening a database, creating collections
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Recoverable problems, e.g. a replica that failed to mirror a write
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Failures surfaced to the caller
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

pub use init_diagnostics as init;
