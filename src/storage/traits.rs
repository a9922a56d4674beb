//! Abstract record store trait.
//!
//! The accumulator talks to storage only through [`RecordStore`], which keeps
//! the integration logic independent of where records live:
//! - [`FileRecordStore`](super::FileRecordStore) for durable production use
//! - [`InMemoryRecordStore`](super::InMemoryRecordStore) for embedding and tests

use crate::error::EnergyResult;
use crate::record::Record;

/// Storage for one [`Record`] per device identifier.
///
/// # Contract
/// - Implementations hold no cached state that could diverge from the backing
///   medium between calls.
/// - `write` is all-or-nothing: after a failed write, `read` returns exactly
///   what it returned before.
/// - Identifiers are validated by every method before use.
pub trait RecordStore: Send + Sync {
    /// Returns the record for `id`, or [`Record::ZERO`] if none was ever
    /// written.
    ///
    /// # Errors
    /// - `InvalidIdentifier` for unsafe identifiers
    /// - `InvalidFormat` / `InvalidData` for corrupt records
    /// - I/O errors wrapped with operation, identifier and path
    fn read(&self, id: &str) -> EnergyResult<Record>;

    /// Validates and durably stores `record` for `id`.
    ///
    /// # Errors
    /// - `InvalidIdentifier` for unsafe identifiers
    /// - record validation errors (negative or non-finite value, bad timestamp)
    /// - I/O errors wrapped with operation, identifier and path
    fn write(&self, id: &str, record: &Record) -> EnergyResult<()>;

    /// Lists the identifiers that have a stored record, sorted.
    ///
    /// # Errors
    /// Returns an I/O error if the backing medium cannot be enumerated.
    fn list(&self) -> EnergyResult<Vec<String>>;
}
