//! Write-to-temp-then-rename record writer.
//!
//! A record file is either fully the old version or fully the new version.
//! The new content goes to a sibling temporary file (`<id>.txt.tmp.<uuid>`),
//! is optionally fsynced, and is then renamed over the final path. Until
//! [`AtomicWriter::commit`] succeeds the final path is never touched, and a
//! writer dropped before commit removes its temporary file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::StorageError;
use crate::identifier::TEMP_MARKER;
use crate::record::Record;

/// Builder for replacing one record file atomically.
#[derive(Debug)]
pub struct AtomicWriter {
    id: String,
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    file: Option<File>,
    sync: bool,
}

impl AtomicWriter {
    /// Create the temporary sibling of `final_path`.
    ///
    /// `file_mode` is applied on Unix; `sync` controls whether commit fsyncs
    /// the file and its directory.
    ///
    /// # Errors
    /// Returns a wrapped I/O error if the temporary file cannot be created.
    pub fn create(
        id: &str,
        final_path: PathBuf,
        file_mode: u32,
        sync: bool,
    ) -> Result<Self, StorageError> {
        let temp_path = final_path.with_extension(format!("txt{TEMP_MARKER}{}", Uuid::new_v4()));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(file_mode);
        }
        #[cfg(not(unix))]
        let _ = file_mode;

        let file = options
            .open(&temp_path)
            .map_err(|e| StorageError::io("create_temp", id, &temp_path, e))?;

        let writer = Self {
            id: id.to_string(),
            temp_path: Some(temp_path),
            final_path,
            file: Some(file),
            sync,
        };

        // umask may have masked bits off at creation.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(temp) = writer.temp_path.as_deref() {
                fs::set_permissions(temp, fs::Permissions::from_mode(file_mode))
                    .map_err(|e| StorageError::io("chmod_temp", id, temp, e))?;
            }
        }

        Ok(writer)
    }

    /// Path of the temporary file, until commit or abort.
    #[must_use]
    pub fn temp_path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    /// Path the record lands on at commit.
    #[must_use]
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Write the full encoded record into the temporary file.
    ///
    /// # Errors
    /// Returns a wrapped I/O error if the write fails.
    pub fn write_record(&mut self, record: &Record) -> Result<(), StorageError> {
        let temp = self.temp_path.clone().unwrap_or_default();
        let file = self.file.as_mut().ok_or_else(|| StorageError::Io {
            op: "write_temp",
            id: self.id.clone(),
            path: temp.clone(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "writer already consumed"),
        })?;
        file.write_all(record.encode().as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| StorageError::io("write_temp", &self.id, temp, e))
    }

    /// Flush, optionally fsync, and rename into place.
    ///
    /// This is the commit point: after it returns `Ok` the new record is
    /// visible (and durable when `sync` is set). On error the temporary file
    /// is removed and the previous record is untouched.
    ///
    /// # Errors
    /// Returns a wrapped I/O error for the step that failed.
    pub fn commit(mut self) -> Result<(), StorageError> {
        let temp = self.temp_path.clone().unwrap_or_default();
        let Some(file) = self.file.take() else {
            return Err(StorageError::Io {
                op: "commit",
                id: self.id.clone(),
                path: temp,
                source: std::io::Error::new(std::io::ErrorKind::Other, "writer already consumed"),
            });
        };

        if self.sync {
            file.sync_all()
                .map_err(|e| StorageError::io("fsync", &self.id, &temp, e))?;
        }
        drop(file);

        fs::rename(&temp, &self.final_path)
            .map_err(|e| StorageError::io("rename", &self.id, &self.final_path, e))?;
        self.temp_path = None;

        // Rename already committed the record; a failed directory sync is logged only.
        if self.sync {
            if let Err(e) = sync_parent_dir(&self.id, &self.final_path) {
                tracing::warn!(device = %self.id, error = %e, "directory sync failed after rename");
            }
        }
        Ok(())
    }

    /// Discard the write, removing the temporary file.
    ///
    /// # Errors
    /// Returns a wrapped I/O error if the temporary file cannot be removed.
    pub fn abort(mut self) -> Result<(), StorageError> {
        self.file.take();
        if let Some(temp) = self.temp_path.take() {
            match fs::remove_file(&temp) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io("remove_temp", &self.id, temp, e)),
            }
        }
        Ok(())
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        self.file.take();
        if let Some(temp) = self.temp_path.take() {
            if let Err(e) = fs::remove_file(&temp) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        device = %self.id,
                        path = %temp.display(),
                        error = %e,
                        "failed to remove temporary record file"
                    );
                }
            }
        }
    }
}

/// Persist the directory entry created by the rename.
#[cfg(unix)]
fn sync_parent_dir(id: &str, path: &Path) -> Result<(), StorageError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| StorageError::io("fsync_dir", id, parent, e))
}

#[cfg(not(unix))]
fn sync_parent_dir(_id: &str, _path: &Path) -> Result<(), StorageError> {
    Ok(())
}

/// Returns true if `name` looks like a temporary record file.
pub(crate) fn is_temp_file_name(name: &str) -> bool {
    name.contains(&format!(".txt{TEMP_MARKER}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_commit_replaces_final() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("ups-001.txt");
        fs::write(&final_path, "1\n1.000000\n").unwrap();

        let mut writer = AtomicWriter::create("ups-001", final_path.clone(), 0o644, true).unwrap();
        let temp = writer.temp_path().unwrap().to_path_buf();
        assert!(temp.exists());
        assert!(is_temp_file_name(temp.file_name().unwrap().to_str().unwrap()));

        writer.write_record(&Record::new(2, 2.5)).unwrap();
        // Final path untouched until commit.
        assert_eq!(read(&final_path), "1\n1.000000\n");

        writer.commit().unwrap();
        assert_eq!(read(&final_path), "2\n2.500000\n");
        assert!(!temp.exists());
    }

    #[test]
    fn test_drop_before_commit_cleans_up() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("ups-001.txt");
        fs::write(&final_path, "1\n1.000000\n").unwrap();

        let temp = {
            let mut writer =
                AtomicWriter::create("ups-001", final_path.clone(), 0o644, false).unwrap();
            writer.write_record(&Record::new(2, 2.5)).unwrap();
            writer.temp_path().unwrap().to_path_buf()
        };

        assert!(!temp.exists());
        assert_eq!(read(&final_path), "1\n1.000000\n");
    }

    #[test]
    fn test_abort_removes_temp() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("pdu.txt");
        let writer = AtomicWriter::create("pdu", final_path.clone(), 0o644, false).unwrap();
        let temp = writer.temp_path().unwrap().to_path_buf();
        writer.abort().unwrap();
        assert!(!temp.exists());
        assert!(!final_path.exists());
    }

    #[test]
    fn test_failed_rename_removes_temp() {
        let dir = tempdir().unwrap();
        // A non-empty directory at the final path makes the rename fail.
        let final_path = dir.path().join("blocked.txt");
        fs::create_dir(&final_path).unwrap();
        fs::write(final_path.join("keep"), "x").unwrap();

        let mut writer = AtomicWriter::create("blocked", final_path.clone(), 0o644, false).unwrap();
        let temp = writer.temp_path().unwrap().to_path_buf();
        writer.write_record(&Record::new(1, 1.0)).unwrap();

        let err = writer.commit().unwrap_err();
        assert!(matches!(err, StorageError::Io { op: "rename", .. }));
        assert!(!temp.exists());
        assert!(final_path.join("keep").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_applies_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let final_path = dir.path().join("ups.txt");
        let mut writer = AtomicWriter::create("ups", final_path.clone(), 0o600, false).unwrap();
        writer.write_record(&Record::new(1, 1.0)).unwrap();
        writer.commit().unwrap();

        let mode = fs::metadata(&final_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o600);
    }
}
