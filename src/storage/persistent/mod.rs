//! Persistent storage backend for wattkeep.
//!
//! Durable, crash-safe storage of one plain-text record per device:
//! - Identifier validation plus root containment before any path is used
//! - Write-to-temp-then-rename for all-or-nothing replacement
//! - Optional fsync of the file and its directory
//! - Cleanup of temporary files left behind by a crash
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               FileRecordStore                │
//! ├──────────────────────────────────────────────┤
//! │  read ──► <root>/<id>.txt                    │
//! │                                              │
//! │  write ─► AtomicWriter                       │
//! │            <root>/<id>.txt.tmp.<uuid>        │
//! │              │ write + fsync                 │
//! │              ↓ rename                        │
//! │            <root>/<id>.txt                   │
//! └──────────────────────────────────────────────┘
//! ```

mod atomic;
mod store;

pub use atomic::AtomicWriter;
pub use store::{FileRecordStore, STALE_TEMP_AGE};

use crate::config::StorageConfig;
use crate::error::EnergyResult;

/// Open (creating if permitted) a file record store.
///
/// # Errors
/// - If the configuration is invalid
/// - If the root is missing and `create_dirs` is off
/// - If the root cannot be created or inspected
///
/// # Example
/// ```rust,no_run
/// use wattkeep::config::StorageConfig;
/// use wattkeep::storage::{open_store, RecordStore};
///
/// let store = open_store(StorageConfig::at("/var/lib/wattkeep"))?;
/// let record = store.read("ups-001")?;
/// # Ok::<(), wattkeep::EnergyError>(())
/// ```
pub fn open_store(config: StorageConfig) -> EnergyResult<FileRecordStore> {
    FileRecordStore::open(config)
}
