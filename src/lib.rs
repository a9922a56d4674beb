//! # wattkeep - crash-safe per-device energy accumulation
//!
//! wattkeep keeps one running energy total (watt-hours) per device. Each new
//! power reading is integrated over the time elapsed since the previous one,
//! and the result is persisted to a small plain-text record that is replaced
//! atomically, so a crash never leaves a half-written total behind.
//!
//! ## Core Concepts
//!
//! - **Identifier**: a path-safe device name; becomes `<id>.txt`
//! - **Record**: the persisted `{timestamp, value}` pair for one device
//! - **RecordStore**: where records live (filesystem or memory)
//! - **EnergyAccumulator**: integrates readings and serializes mutations
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wattkeep::{Config, EnergyAccumulator};
//!
//! let acc = EnergyAccumulator::open(Config::at("/var/lib/wattkeep"))?;
//!
//! // First reading establishes the baseline.
//! assert_eq!(acc.calculate("ups-001", 500.0)?, 0.0);
//!
//! // An hour later, 500 W for one hour has added 500 Wh.
//! let total = acc.calculate("ups-001", 500.0)?;
//! println!("ups-001: {total} Wh ({} Wh stored)", acc.get("ups-001")?);
//! # Ok::<(), wattkeep::EnergyError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accumulator;
pub mod clock;
pub mod config;
pub mod error;
pub mod identifier;
pub mod record;
pub mod stats;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use accumulator::EnergyAccumulator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccumulatorConfig, Config, StorageConfig};
pub use error::{EnergyError, EnergyResult, StorageError, ValidationError};
pub use record::Record;
pub use stats::{CalculationStats, StatsTracker};
pub use storage::{open_store, AtomicWriter, FileRecordStore, InMemoryRecordStore, RecordStore};
