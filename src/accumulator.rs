//! The energy accumulator service.
//!
//! `EnergyAccumulator` integrates successive power readings for each device
//! into a running watt-hour total and persists it through a [`RecordStore`].
//!
//! # Concurrency
//! A single reader/writer lock covers every device: `calculate` holds the
//! writer side for its whole read-integrate-write cycle, `get` and `record`
//! hold the reader side. Mutations are therefore strictly serialized while
//! reads run in parallel with each other.
//!
//! # Per-device lifecycle
//! ```text
//! Unseen ──calculate──► Baseline(0) ──calculate──► Accumulating(v) ─┐
//!                                                        ▲          │
//!                                                        └──────────┘
//! ```

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{AccumulatorConfig, Config};
use crate::error::{EnergyError, EnergyResult, StorageError, ValidationError};
use crate::identifier;
use crate::record::Record;
use crate::stats::{CalculationStats, StatsTracker};
use crate::storage::{FileRecordStore, RecordStore};

/// Milliseconds in one hour.
pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;

fn lock_err(context: &'static str) -> EnergyError {
    EnergyError::Storage(StorageError::PoisonedLock { context })
}

/// Rounds `value` to a multiple of `precision`, halves rounding up.
#[must_use]
pub fn round_to_precision(value: f64, precision: f64) -> f64 {
    (value / precision + 0.5).floor() * precision
}

/// Adds `power_w` sustained for `elapsed_hours` to `prior_wh`, rounded to
/// `precision`.
#[must_use]
pub fn integrate(prior_wh: f64, power_w: f64, elapsed_hours: f64, precision: f64) -> f64 {
    round_to_precision(prior_wh + power_w * elapsed_hours, precision)
}

/// Outcome of one calculation, before statistics are applied.
struct Step {
    total: f64,
    persisted_at: Option<DateTime<Utc>>,
}

/// Persistent per-device energy accumulator.
pub struct EnergyAccumulator {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    config: AccumulatorConfig,
    lock: RwLock<()>,
    stats: StatsTracker,
}

impl std::fmt::Debug for EnergyAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyAccumulator")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl EnergyAccumulator {
    /// Open an accumulator over a file store, using the system clock.
    ///
    /// # Errors
    /// Configuration or storage-root errors, see [`FileRecordStore::open`].
    pub fn open(config: Config) -> EnergyResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open an accumulator over a file store, sharing `clock` with the store.
    ///
    /// # Errors
    /// Configuration or storage-root errors, see [`FileRecordStore::open`].
    pub fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> EnergyResult<Self> {
        let config = config.validate()?;
        let store = FileRecordStore::open_with_clock(config.storage, Arc::clone(&clock))?;
        Self::new(Arc::new(store), config.accumulator, clock)
    }

    /// Build an accumulator over any record store.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: AccumulatorConfig,
        clock: Arc<dyn Clock>,
    ) -> EnergyResult<Self> {
        let config = config.validate()?;
        let stats = StatsTracker::new(config.stats_enabled);
        Ok(Self {
            store,
            clock,
            config,
            lock: RwLock::new(()),
            stats,
        })
    }

    /// Integrate a new power reading for `id` and return the updated total
    /// in watt-hours.
    ///
    /// The first reading for a device establishes the baseline and returns
    /// `0`. A reading whose time is not after the stored one returns the
    /// stored total unchanged and writes nothing.
    ///
    /// # Errors
    /// - `InvalidIdentifier` for unsafe identifiers
    /// - `InvalidValue` for NaN or infinite power
    /// - `NegativeValueNotAllowed` for negative power when not allowed, or a
    ///   total that would drop below zero
    /// - `Timeout` if the configured budget ran out before persisting
    /// - storage errors from reading or writing the record
    ///
    /// On error the stored record is unchanged.
    pub fn calculate(&self, id: &str, power_w: f64) -> EnergyResult<f64> {
        let started = Instant::now();
        match self.calculate_step(id, power_w, started) {
            Ok(step) => {
                self.stats.record_success(started.elapsed(), step.persisted_at);
                Ok(step.total)
            }
            Err(e) => {
                self.stats.record_failure();
                Err(e)
            }
        }
    }

    fn calculate_step(&self, id: &str, power_w: f64, started: Instant) -> EnergyResult<Step> {
        identifier::validate(id)?;
        self.validate_power(power_w)?;

        let _guard = self.lock.write().map_err(|_| lock_err("accumulator.calculate"))?;

        let prior = self.store.read(id)?;
        let now = self.clock.now();

        let total = if prior.is_baseline() {
            debug!(device = id, power_w, "establishing baseline");
            0.0
        } else {
            let elapsed_ms = now.timestamp_millis() - prior.timestamp;
            #[allow(clippy::cast_precision_loss)]
            let elapsed_hours = elapsed_ms as f64 / MILLIS_PER_HOUR;
            if elapsed_hours <= 0.0 {
                warn!(
                    device = id,
                    stored_at = prior.timestamp,
                    now = now.timestamp_millis(),
                    "clock did not advance; keeping stored total"
                );
                return Ok(Step {
                    total: prior.value,
                    persisted_at: None,
                });
            }
            integrate(prior.value, power_w, elapsed_hours, self.config.precision)
        };

        self.check_budget(id, started)?;

        self.store.write(id, &Record::at(now, total))?;
        debug!(device = id, power_w, total_wh = total, "energy total updated");

        Ok(Step {
            total,
            persisted_at: Some(now),
        })
    }

    fn validate_power(&self, power_w: f64) -> Result<(), ValidationError> {
        if !power_w.is_finite() {
            return Err(ValidationError::InvalidValue {
                field: "power",
                value: power_w,
            });
        }
        if power_w < 0.0 && !self.config.allow_negative_power {
            return Err(ValidationError::NegativeValueNotAllowed {
                field: "power",
                value: power_w,
            });
        }
        Ok(())
    }

    fn check_budget(&self, id: &str, started: Instant) -> EnergyResult<()> {
        let Some(budget) = self.config.max_calculation_time() else {
            return Ok(());
        };
        let elapsed = started.elapsed();
        if elapsed <= budget {
            return Ok(());
        }
        let elapsed_ms = duration_ms(elapsed);
        let budget_ms = duration_ms(budget);
        warn!(device = id, elapsed_ms, budget_ms, "calculation over budget; not persisting");
        Err(EnergyError::Timeout {
            elapsed_ms,
            budget_ms,
        })
    }

    /// Current total for `id` in watt-hours; `0` if nothing was recorded yet.
    ///
    /// # Errors
    /// `InvalidIdentifier` or storage errors from reading the record.
    pub fn get(&self, id: &str) -> EnergyResult<f64> {
        Ok(self.record(id)?.value)
    }

    /// Full stored record for `id`; [`Record::ZERO`] if nothing was recorded.
    ///
    /// # Errors
    /// `InvalidIdentifier` or storage errors from reading the record.
    pub fn record(&self, id: &str) -> EnergyResult<Record> {
        identifier::validate(id)?;
        let _guard = self.lock.read().map_err(|_| lock_err("accumulator.get"))?;
        self.store.read(id)
    }

    /// Identifiers with a stored record, sorted.
    ///
    /// # Errors
    /// Storage errors from enumerating records.
    pub fn devices(&self) -> EnergyResult<Vec<String>> {
        let _guard = self.lock.read().map_err(|_| lock_err("accumulator.devices"))?;
        self.store.list()
    }

    /// Snapshot of operation statistics.
    #[must_use]
    pub fn stats(&self) -> CalculationStats {
        self.stats.snapshot()
    }

    /// Reset operation statistics.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// The accumulation settings in effect.
    #[must_use]
    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
