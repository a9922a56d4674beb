//! Filesystem-backed record store.
//!
//! One plain-text file per device under the storage root. The store keeps no
//! cached state: every call goes to the filesystem, so several stores (or
//! processes) pointed at the same root observe the same records.

use std::fs::{self, DirBuilder, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::error::{EnergyResult, StorageError};
use crate::identifier;
use crate::record::{ParseRecordError, Record, MAX_ENCODED_LEN};
use crate::storage::traits::RecordStore;

use super::atomic::{is_temp_file_name, AtomicWriter};

/// Temporary files older than this are treated as leftovers of a crash.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60);

/// Durable record store rooted at a directory.
pub struct FileRecordStore {
    config: StorageConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FileRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRecordStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FileRecordStore {
    /// Open a store validating records against the system clock.
    ///
    /// # Errors
    /// See [`FileRecordStore::open_with_clock`].
    pub fn open(config: StorageConfig) -> EnergyResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open a store validating records against `clock`.
    ///
    /// The root directory is created (with `dir_mode`) when missing and
    /// `create_dirs` is set. Stale temporary files are purged.
    ///
    /// # Errors
    /// - `InvalidConfig` if the configuration fails validation
    /// - `DirectoryMissing` if the root is absent and creation is disabled
    /// - `NotADirectory` if the root exists but is not a directory
    /// - wrapped I/O errors from creating or inspecting the root
    pub fn open_with_clock(config: StorageConfig, clock: Arc<dyn Clock>) -> EnergyResult<Self> {
        let config = config.validate()?;
        ensure_root(&config)?;

        let store = Self { config, clock };
        let purged = store.purge_stale_temp_files(STALE_TEMP_AGE)?;
        info!(
            root = %store.config.root.display(),
            sync_on_write = store.config.sync_on_write,
            purged,
            "record store opened"
        );
        Ok(store)
    }

    /// The storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// The storage configuration in effect.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Validates `id` and returns the path of its record file.
    ///
    /// # Errors
    /// `InvalidIdentifier` for unsafe identifiers, `PathEscape` if the built
    /// path would leave the root.
    pub fn path_for(&self, id: &str) -> EnergyResult<PathBuf> {
        identifier::validate(id)?;
        Ok(identifier::contained_path(&self.config.root, id)?)
    }

    /// Starts an atomic replacement of the record for `id`.
    ///
    /// [`RecordStore::write`] is `begin_write` + `write_record` + `commit`;
    /// exposing the stages lets callers abandon a write before the rename.
    ///
    /// # Errors
    /// `InvalidIdentifier`, `PathEscape`, or a wrapped I/O error.
    pub fn begin_write(&self, id: &str) -> EnergyResult<AtomicWriter> {
        let path = self.path_for(id)?;
        Ok(AtomicWriter::create(
            id,
            path,
            self.config.file_mode,
            self.config.sync_on_write,
        )?)
    }

    /// Loads the record for `id`, signalling absence with `NotFound`.
    fn load(&self, id: &str, path: &Path) -> Result<Record, StorageError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    id: id.to_string(),
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(StorageError::io("read", id, path, e)),
        };

        let mut bytes = Vec::new();
        file.take(MAX_ENCODED_LEN as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| StorageError::io("read", id, path, e))?;
        if bytes.len() > MAX_ENCODED_LEN {
            return Err(StorageError::InvalidFormat {
                id: id.to_string(),
                path: path.to_path_buf(),
                source: ParseRecordError::TooLarge {
                    limit: MAX_ENCODED_LEN,
                },
            });
        }

        let record = Record::decode_bytes(&bytes).map_err(|source| StorageError::InvalidFormat {
            id: id.to_string(),
            path: path.to_path_buf(),
            source,
        })?;

        record
            .validate(self.clock.now())
            .map_err(|source| StorageError::InvalidData {
                id: id.to_string(),
                path: path.to_path_buf(),
                source,
            })?;

        Ok(record)
    }

    /// Removes temporary record files last modified more than `older_than`
    /// ago. Returns how many were removed.
    ///
    /// Younger temporary files may belong to a write in progress elsewhere
    /// and are left alone.
    ///
    /// # Errors
    /// Returns a wrapped I/O error if the root cannot be listed.
    pub fn purge_stale_temp_files(&self, older_than: Duration) -> EnergyResult<usize> {
        let root = &self.config.root;
        let entries = fs::read_dir(root).map_err(|e| StorageError::io("purge", "", root, e))?;

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("purge", "", root, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_temp_file_name(name) {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.map_or(true, |age| age < older_than) {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to purge stale temp file"),
            }
        }

        if removed > 0 {
            info!(root = %root.display(), removed, "purged stale temporary record files");
        }
        Ok(removed)
    }
}

impl RecordStore for FileRecordStore {
    fn read(&self, id: &str) -> EnergyResult<Record> {
        let path = self.path_for(id)?;
        match self.load(id, &path) {
            Ok(record) => Ok(record),
            Err(StorageError::NotFound { .. }) => Ok(Record::ZERO),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, id: &str, record: &Record) -> EnergyResult<()> {
        identifier::validate(id)?;
        record.validate(self.clock.now())?;

        let mut writer = self.begin_write(id)?;
        writer.write_record(record)?;
        let path = writer.final_path().to_path_buf();
        writer.commit()?;

        debug!(
            device = id,
            path = %path.display(),
            timestamp = record.timestamp,
            total_wh = record.value,
            "record persisted"
        );
        Ok(())
    }

    fn list(&self) -> EnergyResult<Vec<String>> {
        let root = &self.config.root;
        let entries = fs::read_dir(root).map_err(|e| StorageError::io("list", "", root, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("list", "", root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(identifier::identifier_from_file_name) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn ensure_root(config: &StorageConfig) -> Result<(), StorageError> {
    let root = &config.root;
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::NotADirectory { path: root.clone() }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if !config.create_dirs {
                return Err(StorageError::DirectoryMissing { path: root.clone() });
            }
            let mut builder = DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(config.dir_mode);
            }
            builder
                .create(root)
                .map_err(|e| StorageError::io("create_dir", "", root, e))?;
            info!(root = %root.display(), "created storage directory");
            Ok(())
        }
        Err(e) => Err(StorageError::io("stat_root", "", root, e)),
    }
}
