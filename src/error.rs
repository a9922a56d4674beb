//! Error types for wattkeep.
//!
//! All errors are strongly typed using thiserror. Validation failures are
//! separated from storage failures so callers can tell "this input will never
//! work" apart from "the disk misbehaved this cycle".

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::record::ParseRecordError;

/// Validation errors raised before any mutation is attempted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid device identifier {id:?}: {reason}")]
    InvalidIdentifier {
        id: String,
        reason: &'static str,
    },

    #[error("Invalid {field}: {value} is not a finite number")]
    InvalidValue {
        field: &'static str,
        value: f64,
    },

    #[error("Negative {field} not allowed: {value}")]
    NegativeValueNotAllowed {
        field: &'static str,
        value: f64,
    },

    #[error("Timestamp {timestamp} is out of range: {reason}")]
    TimestampOutOfRange {
        timestamp: i64,
        reason: &'static str,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Storage errors raised by record stores.
///
/// I/O failures always carry the operation name, the device identifier and
/// the path involved.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corrupt record for {id:?} at {}: {source}", path.display())]
    InvalidFormat {
        id: String,
        path: PathBuf,
        #[source]
        source: ParseRecordError,
    },

    #[error("Record for {id:?} at {} failed validation: {source}", path.display())]
    InvalidData {
        id: String,
        path: PathBuf,
        #[source]
        source: ValidationError,
    },

    #[error("{op} {id:?}: permission denied at {}", path.display())]
    PermissionDenied {
        op: &'static str,
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op} {id:?}: disk full at {}", path.display())]
    DiskFull {
        op: &'static str,
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{op} {id:?} failed at {}: {source}", path.display())]
    Io {
        op: &'static str,
        id: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Internal signal; `read` translates it into a zero record.
    #[error("No record for {id:?} at {}", path.display())]
    NotFound {
        id: String,
        path: PathBuf,
    },

    #[error("Storage directory {} does not exist and creation is disabled", path.display())]
    DirectoryMissing {
        path: PathBuf,
    },

    #[error("Storage root {} is not a directory", path.display())]
    NotADirectory {
        path: PathBuf,
    },

    #[error("Path for {id:?} escapes the storage root: {}", path.display())]
    PathEscape {
        id: String,
        path: PathBuf,
    },

    #[error("Poisoned lock: {context}")]
    PoisonedLock {
        context: &'static str,
    },
}

impl StorageError {
    /// Wraps an I/O error with its operation context, classifying the
    /// permission and disk-full cases.
    #[must_use]
    pub fn io(op: &'static str, id: &str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let id = id.to_string();
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { op, id, path, source },
            io::ErrorKind::StorageFull => Self::DiskFull { op, id, path, source },
            _ => Self::Io { op, id, path, source },
        }
    }

    /// Returns true for the internal not-found signal.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Top-level error type for wattkeep.
#[derive(Debug, Error)]
pub enum EnergyError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Calculation exceeded its time budget: {elapsed_ms}ms > {budget_ms}ms")]
    Timeout {
        elapsed_ms: u64,
        budget_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl EnergyError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if the identifier was rejected.
    #[must_use]
    pub const fn is_invalid_identifier(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::InvalidIdentifier { .. }))
    }

    /// Returns true if retrying on the next cycle may succeed.
    ///
    /// The core never retries internally; this only informs the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Storage(e) => matches!(
                e,
                StorageError::Io { .. }
                    | StorageError::DiskFull { .. }
                    | StorageError::PermissionDenied { .. }
                    | StorageError::DirectoryMissing { .. }
            ),
            Self::Timeout { .. } => true,
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for wattkeep operations.
pub type EnergyResult<T> = Result<T, EnergyError>;
