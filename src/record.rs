//! The persisted per-device record and its two-line text format.
//!
//! ```text
//! 1718000000000
//! 1500.750000
//! ```
//!
//! The first line is the write instant in milliseconds since the Unix epoch,
//! the second the accumulated energy in watt-hours with a fixed 6-digit
//! fraction. Each line ends with a newline.

use std::fmt;
use std::num::{ParseFloatError, ParseIntError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;

/// How far ahead of "now" (in milliseconds) a record timestamp may be before
/// it is treated as clock corruption.
pub const MAX_FUTURE_SKEW_MS: i64 = 24 * 60 * 60 * 1000;

/// Fixed number of fraction digits written for the value line.
pub const VALUE_PRECISION_DIGITS: usize = 6;

/// Upper bound on the encoded size of any record, in bytes.
///
/// Covers the widest timestamp and `f64::MAX` written with six fraction
/// digits; anything longer on disk cannot be a record.
pub const MAX_ENCODED_LEN: usize = 512;

/// Errors from decoding the two-line record format.
#[derive(Debug, Error)]
pub enum ParseRecordError {
    #[error("expected exactly 2 lines, found {found}")]
    WrongLineCount {
        found: usize,
    },

    #[error("line {line} is empty")]
    EmptyLine {
        line: usize,
    },

    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] ParseIntError),

    #[error("invalid value: {0}")]
    Value(#[from] ParseFloatError),

    #[error("content exceeds {limit} bytes")]
    TooLarge {
        limit: usize,
    },

    #[error("content is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Accumulated energy for one device at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Milliseconds since the Unix epoch when the record was written.
    pub timestamp: i64,
    /// Accumulated energy in watt-hours.
    pub value: f64,
}

impl Record {
    /// The zero record returned for identifiers that have never been written.
    pub const ZERO: Self = Self {
        timestamp: 0,
        value: 0.0,
    };

    /// Creates a record from raw parts.
    #[must_use]
    pub const fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Creates a record stamped at the given instant.
    #[must_use]
    pub fn at(instant: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp: instant.timestamp_millis(),
            value,
        }
    }

    /// Returns true for the zero record that stands in for "never written".
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        self.timestamp == 0 && self.value == 0.0
    }

    /// Returns the timestamp as a UTC instant, if representable.
    #[must_use]
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Checks the record invariants against the given "now".
    ///
    /// # Errors
    ///
    /// - `TimestampOutOfRange` if the timestamp is negative or more than
    ///   [`MAX_FUTURE_SKEW_MS`] ahead of `now`
    /// - `InvalidValue` if the value is NaN or infinite
    /// - `NegativeValueNotAllowed` if the value is below zero
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.timestamp < 0 {
            return Err(ValidationError::TimestampOutOfRange {
                timestamp: self.timestamp,
                reason: "negative",
            });
        }
        if self.timestamp > now.timestamp_millis().saturating_add(MAX_FUTURE_SKEW_MS) {
            return Err(ValidationError::TimestampOutOfRange {
                timestamp: self.timestamp,
                reason: "more than 24 hours in the future",
            });
        }
        if !self.value.is_finite() {
            return Err(ValidationError::InvalidValue {
                field: "energy",
                value: self.value,
            });
        }
        if self.value < 0.0 {
            return Err(ValidationError::NegativeValueNotAllowed {
                field: "energy",
                value: self.value,
            });
        }
        Ok(())
    }

    /// Serializes the record into its on-disk form.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}\n{:.prec$}\n",
            self.timestamp,
            self.value,
            prec = VALUE_PRECISION_DIGITS
        )
    }

    /// Parses the on-disk form from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `NotUtf8` for non-UTF-8 content, otherwise as [`Record::decode`].
    pub fn decode_bytes(content: &[u8]) -> Result<Self, ParseRecordError> {
        Self::decode(std::str::from_utf8(content)?)
    }

    /// Parses the on-disk form.
    ///
    /// Surrounding whitespace on each line is ignored; anything other than
    /// exactly two non-empty lines is rejected.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseRecordError`] describing the first problem found.
    pub fn decode(content: &str) -> Result<Self, ParseRecordError> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() != 2 {
            return Err(ParseRecordError::WrongLineCount { found: lines.len() });
        }

        let ts_line = lines[0].trim();
        if ts_line.is_empty() {
            return Err(ParseRecordError::EmptyLine { line: 1 });
        }
        let value_line = lines[1].trim();
        if value_line.is_empty() {
            return Err(ParseRecordError::EmptyLine { line: 2 });
        }

        let timestamp = ts_line.parse::<i64>()?;
        let value = value_line.parse::<f64>()?;
        Ok(Self { timestamp, value })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} Wh @ {}", self.value, self.timestamp)
    }
}
