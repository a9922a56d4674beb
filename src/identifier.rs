//! Device identifier validation and safe path construction.
//!
//! An identifier becomes a filename component (`<id>.txt`), so it must never
//! be able to name anything outside the storage root. Two independent checks
//! enforce that:
//!
//! 1. [`validate`] rejects unsafe identifiers before any path is built.
//! 2. [`contained_path`] lexically cleans the root and the joined path and
//!    confirms the result is a direct child of the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{StorageError, ValidationError};

/// File extension of record files.
pub const RECORD_EXTENSION: &str = "txt";

/// Marker between the record name and the random suffix of a temporary file
/// (`<id>.txt.tmp.<uuid>`).
pub const TEMP_MARKER: &str = ".tmp.";

/// Longest filename most filesystems accept, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Longest accepted identifier in bytes.
///
/// Sized so the temporary file written before each rename, the longest name
/// derived from an identifier, still fits in [`MAX_FILE_NAME_LEN`].
pub const MAX_IDENTIFIER_LEN: usize = MAX_FILE_NAME_LEN
    - (1 + RECORD_EXTENSION.len() + TEMP_MARKER.len() + uuid::fmt::Hyphenated::LENGTH);

fn reject(id: &str, reason: &'static str) -> ValidationError {
    ValidationError::InvalidIdentifier {
        id: id.to_string(),
        reason,
    }
}

/// Checks that `id` is safe to embed as a filename component.
///
/// # Errors
///
/// Returns `InvalidIdentifier` if the identifier is empty, is `.` or `..`,
/// starts with a dot, contains `/` or `\`, contains NUL or control
/// characters, or is longer than [`MAX_IDENTIFIER_LEN`] bytes.
pub fn validate(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(reject(id, "is empty"));
    }
    if id == "." || id == ".." {
        return Err(reject(id, "is a relative directory reference"));
    }
    if id.starts_with('.') {
        return Err(reject(id, "starts with a dot"));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(reject(id, "contains a path separator"));
    }
    if id.chars().any(char::is_control) {
        return Err(reject(id, "contains control characters"));
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(reject(id, "is too long"));
    }
    Ok(())
}

/// Lexically normalizes a path: drops `.` components and resolves `..`
/// against preceding components. Does not touch the filesystem.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Builds `<root>/<id>.txt` and confirms it stays directly inside `root`.
///
/// Callers are expected to have run [`validate`] first; this is the second
/// line of defense.
///
/// # Errors
///
/// Returns `PathEscape` if the cleaned path is not a direct child of the
/// cleaned root.
pub fn contained_path(root: &Path, id: &str) -> Result<PathBuf, StorageError> {
    let root_clean = clean_path(root);
    let candidate = clean_path(&root.join(format!("{id}.{RECORD_EXTENSION}")));

    let escape = || StorageError::PathEscape {
        id: id.to_string(),
        path: candidate.clone(),
    };

    let relative = candidate.strip_prefix(&root_clean).map_err(|_| escape())?;
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(candidate.clone()),
        _ => Err(escape()),
    }
}

/// Recovers the identifier from a record file name, if it is one.
#[must_use]
pub fn identifier_from_file_name(name: &str) -> Option<&str> {
    let id = name.strip_suffix(RECORD_EXTENSION)?.strip_suffix('.')?;
    validate(id).ok().map(|()| id)
}
