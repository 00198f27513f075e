//! Durable key/value fallback for the price cache.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;
use tempfile::NamedTempFile;

use crate::errors::BackupError;

/// Last-resort store consulted when memory has nothing servable.
///
/// Payloads are opaque JSON strings produced by the cache.
pub trait BackupStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, BackupError>;

    fn save(&self, key: &str, payload: &str) -> Result<(), BackupError>;

    fn remove(&self, key: &str) -> Result<(), BackupError>;
}

/// Process-local backup, mainly for tests and hosts without a disk.
#[derive(Debug, Default)]
pub struct InMemoryBackupStore {
    data: Mutex<HashMap<String, String>>,
}

impl InMemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.data.lock().unwrap_or_else(|poisoned| {
            warn!("In-memory backup lock was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

impl BackupStore for InMemoryBackupStore {
    fn load(&self, key: &str) -> Result<Option<String>, BackupError> {
        Ok(self.data().get(key).cloned())
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), BackupError> {
        self.data().insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackupError> {
        self.data().remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory.
///
/// Every write goes to its own uniquely named temporary file in the same
/// directory and is renamed into place, so a reader never sees a
/// half-written file and concurrent writers never share a temp path.
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    dir: PathBuf,
}

impl FileBackupStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys use `:` as separator, which is not portable in file names.
    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '.'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl BackupStore for FileBackupStore {
    fn load(&self, key: &str) -> Result<Option<String>, BackupError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), BackupError> {
        let target = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(payload.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackupError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
