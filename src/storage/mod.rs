//! Record storage for wattkeep.
//!
//! [`RecordStore`] is the abstract interface; [`FileRecordStore`] is the
//! durable backend and [`InMemoryRecordStore`] the volatile one.

mod memory;
mod persistent;
mod traits;

pub use memory::InMemoryRecordStore;
pub use persistent::{open_store, AtomicWriter, FileRecordStore, STALE_TEMP_AGE};
pub use traits::RecordStore;
