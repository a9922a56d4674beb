//! Operation statistics for the accumulator.
//!
//! Purely additive counters guarded by their own lock. Nothing here feeds
//! back into calculations.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of a new latency sample in the moving average.
pub const LATENCY_SAMPLE_WEIGHT: f64 = 0.1;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationStats {
    /// Calculation attempts, successful or not.
    pub calculations: u64,
    /// Failed calculation attempts.
    pub errors: u64,
    /// When a record was last persisted by a calculation.
    pub last_update: Option<DateTime<Utc>>,
    /// Exponentially weighted moving average of calculation latency, in
    /// microseconds.
    pub average_latency_us: f64,
}

impl CalculationStats {
    /// The moving-average latency as a `Duration`.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        Duration::from_secs_f64(self.average_latency_us.max(0.0) / 1_000_000.0)
    }
}

/// Thread-safe statistics collector; a no-op when disabled.
#[derive(Debug)]
pub struct StatsTracker {
    enabled: bool,
    inner: Mutex<CalculationStats>,
}

impl StatsTracker {
    /// Create a tracker; when `enabled` is false every update is ignored.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Mutex::new(CalculationStats::default()),
        }
    }

    /// Whether statistics are being collected.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Count a successful calculation taking `latency`.
    ///
    /// `persisted_at` is the instant of the record written, or `None` when the
    /// calculation left the record unchanged.
    pub fn record_success(&self, latency: Duration, persisted_at: Option<DateTime<Utc>>) {
        if !self.enabled {
            return;
        }
        let mut stats = self.lock();
        stats.calculations += 1;
        if persisted_at.is_some() {
            stats.last_update = persisted_at;
        }

        let sample = latency.as_secs_f64() * 1_000_000.0;
        stats.average_latency_us = if stats.average_latency_us == 0.0 {
            sample
        } else {
            stats.average_latency_us * (1.0 - LATENCY_SAMPLE_WEIGHT)
                + sample * LATENCY_SAMPLE_WEIGHT
        };
    }

    /// Count a failed calculation.
    pub fn record_failure(&self) {
        if !self.enabled {
            return;
        }
        let mut stats = self.lock();
        stats.calculations += 1;
        stats.errors += 1;
    }

    /// Copy of the current counters (all zeros when disabled).
    #[must_use]
    pub fn snapshot(&self) -> CalculationStats {
        if !self.enabled {
            return CalculationStats::default();
        }
        *self.lock()
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        *self.lock() = CalculationStats::default();
    }

    // Poisoning is ignored.
    fn lock(&self) -> std::sync::MutexGuard<'_, CalculationStats> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_success_and_failure() {
        let stats = StatsTracker::new(true);
        let now = Utc::now();
        stats.record_success(Duration::from_micros(100), Some(now));
        stats.record_failure();
        stats.record_success(Duration::from_micros(100), None);

        let snap = stats.snapshot();
        assert_eq!(snap.calculations, 3);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.last_update, Some(now));
    }

    #[test]
    fn test_latency_ema_weights() {
        let stats = StatsTracker::new(true);
        stats.record_success(Duration::from_micros(1000), None);
        assert!((stats.snapshot().average_latency_us - 1000.0).abs() < 1e-6);

        stats.record_success(Duration::from_micros(2000), None);
        // 0.9 * 1000 + 0.1 * 2000
        assert!((stats.snapshot().average_latency_us - 1100.0).abs() < 1e-6);

        let avg = stats.snapshot().average_latency();
        assert!((avg.as_secs_f64() - 0.0011).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_is_noop() {
        let stats = StatsTracker::new(false);
        stats.record_success(Duration::from_millis(5), Some(Utc::now()));
        stats.record_failure();
        assert!(!stats.is_enabled());
        assert_eq!(stats.snapshot(), CalculationStats::default());
    }

    #[test]
    fn test_reset() {
        let stats = StatsTracker::default();
        stats.record_failure();
        stats.reset();
        assert_eq!(stats.snapshot(), CalculationStats::default());
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = StatsTracker::default();
        stats.record_success(Duration::from_micros(10), None);
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        assert!(json.contains("\"calculations\":1"));
    }
}
