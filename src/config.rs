//! Configuration for the record store and the accumulator.
//!
//! Loading and merging (YAML, environment) happen outside this crate; the
//! types here derive serde so a loader can deserialize them directly, and
//! [`Config::validate`] is the single gate every value passes before it is
//! handed to the core.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnergyError, EnergyResult, ValidationError};

fn invalid(reason: impl Into<String>) -> EnergyError {
    EnergyError::Validation(ValidationError::InvalidConfig {
        reason: reason.into(),
    })
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one `<id>.txt` record per device.
    pub root: PathBuf,
    /// Permission bits for record files (Unix only).
    pub file_mode: u32,
    /// Permission bits for created directories (Unix only).
    pub dir_mode: u32,
    /// Whether to fsync every write before renaming it into place.
    pub sync_on_write: bool,
    /// Whether a missing root directory may be created.
    pub create_dirs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            file_mode: 0o644,
            dir_mode: 0o755,
            sync_on_write: true,
            create_dirs: true,
        }
    }
}

impl StorageConfig {
    const MAX_MODE: u32 = 0o7777;

    /// Creates a default configuration rooted at `root`.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty root or mode bits above `0o7777`.
    pub fn validate(self) -> EnergyResult<Self> {
        if self.root.as_os_str().is_empty() {
            return Err(invalid("storage root must not be empty"));
        }
        if self.file_mode > Self::MAX_MODE {
            return Err(invalid(format!(
                "file_mode {:o} exceeds {:o}",
                self.file_mode,
                Self::MAX_MODE
            )));
        }
        if self.dir_mode > Self::MAX_MODE {
            return Err(invalid(format!(
                "dir_mode {:o} exceeds {:o}",
                self.dir_mode,
                Self::MAX_MODE
            )));
        }
        Ok(self)
    }
}

/// Accumulation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    /// Rounding granularity of totals, in watt-hours.
    pub precision: f64,
    /// Whether negative power readings are accepted.
    pub allow_negative_power: bool,
    /// Budget for one calculation; checked right before persisting.
    /// `None` disables the check.
    pub max_calculation_time_ms: Option<u64>,
    /// Whether operation statistics are collected.
    pub stats_enabled: bool,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            precision: 0.01,
            allow_negative_power: false,
            max_calculation_time_ms: None,
            stats_enabled: true,
        }
    }
}

impl AccumulatorConfig {
    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a non-finite or non-positive precision or a
    /// zero time budget.
    pub fn validate(self) -> EnergyResult<Self> {
        if !self.precision.is_finite() || self.precision <= 0.0 {
            return Err(invalid(format!(
                "precision must be a positive finite number (got {})",
                self.precision
            )));
        }
        if self.max_calculation_time_ms == Some(0) {
            return Err(invalid("max_calculation_time_ms must be positive when set"));
        }
        Ok(self)
    }

    /// The calculation budget as a `Duration`, if one is configured.
    #[must_use]
    pub fn max_calculation_time(&self) -> Option<Duration> {
        self.max_calculation_time_ms.map(Duration::from_millis)
    }
}

/// Complete configuration handed to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Accumulation settings.
    pub accumulator: AccumulatorConfig,
}

impl Config {
    /// Creates a default configuration rooted at `root`.
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::at(root),
            accumulator: AccumulatorConfig::default(),
        }
    }

    /// Validates both sections.
    ///
    /// # Errors
    ///
    /// Returns the first `InvalidConfig` found.
    pub fn validate(self) -> EnergyResult<Self> {
        Ok(Self {
            storage: self.storage.validate()?,
            accumulator: self.accumulator.validate()?,
        })
    }
}
