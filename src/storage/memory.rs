//! In-memory storage backend.
//!
//! Thread-safe, non-durable implementation of [`RecordStore`]. It applies the
//! same identifier and record validation as the file store, so it is a
//! faithful stand-in for embedded usage, tests and benchmarks.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::error::{EnergyResult, StorageError};
use crate::identifier;
use crate::record::Record;
use crate::storage::traits::RecordStore;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::PoisonedLock { context }
}

/// Thread-safe in-memory record store.
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl InMemoryRecordStore {
    /// Create a new empty store validating against the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty store validating against `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            clock,
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn read(&self, id: &str) -> EnergyResult<Record> {
        identifier::validate(id)?;
        let records = self.records.read().map_err(|_| lock_err("record.read"))?;
        Ok(records.get(id).copied().unwrap_or(Record::ZERO))
    }

    fn write(&self, id: &str, record: &Record) -> EnergyResult<()> {
        identifier::validate(id)?;
        record.validate(self.clock.now())?;
        let mut records = self.records.write().map_err(|_| lock_err("record.write"))?;
        records.insert(id.to_string(), *record);
        Ok(())
    }

    fn list(&self) -> EnergyResult<Vec<String>> {
        let records = self.records.read().map_err(|_| lock_err("record.list"))?;
        Ok(records.keys().cloned().collect())
    }
}
