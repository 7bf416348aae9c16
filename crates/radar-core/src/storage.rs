//! Persistent storage backed by JSON files.
//!
//! Layout under the data directory:
//!
//! - `exposure_info.json` - the last persisted [`ExposureInfo`]
//! - `preferences.json` - string-keyed timestamps (e.g. the next decoy request)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::exposure::ExposureInfo;
use crate::ports::{ExposureStore, TimestampStore};

const EXPOSURE_FILE: &str = "exposure_info.json";
const PREFERENCES_FILE: &str = "preferences.json";

/// Returns the platform data directory for radar.
///
/// On Linux: `/var/lib/radar/`. Elsewhere: the per-user data directory.
///
/// # Errors
///
/// Returns [`StorageError::DataDirUnavailable`] if no home directory exists.
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/radar"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "radar")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::DataDirUnavailable)
    }
}

/// File-backed store for exposure info and scheduler timestamps.
#[derive(Debug)]
pub struct JsonFileStore {
    data_dir: PathBuf,
    // Serializes read-modify-write of the preferences map.
    preferences_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `data_dir`. Nothing is touched until the
    /// first write.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            preferences_lock: Mutex::new(()),
        }
    }

    /// Path of the persisted exposure record.
    #[must_use]
    pub fn exposure_path(&self) -> PathBuf {
        self.data_dir.join(EXPOSURE_FILE)
    }

    /// Path of the preferences file.
    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE)
    }

    fn load_preferences(&self) -> Result<BTreeMap<String, DateTime<Utc>>, StorageError> {
        Ok(load_json(&self.preferences_path())?.unwrap_or_default())
    }
}

impl ExposureStore for JsonFileStore {
    fn read(&self) -> Result<Option<ExposureInfo>, StorageError> {
        load_json(&self.exposure_path())
    }

    fn write(&self, info: &ExposureInfo) -> Result<(), StorageError> {
        save_json(&self.exposure_path(), info)
    }
}

impl TimestampStore for JsonFileStore {
    fn read_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.load_preferences()?.get(key).copied())
    }

    fn write_timestamp(&self, key: &str, value: DateTime<Utc>) -> Result<(), StorageError> {
        let _guard = self
            .preferences_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut preferences = self.load_preferences()?;
        preferences.insert(key.to_owned(), value);
        save_json(&self.preferences_path(), &preferences)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_str(&content).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Writes to a sibling temp file and renames it over the target.
fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let content = serde_json::to_string_pretty(value).map_err(StorageError::Serialize)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(|source| StorageError::Write {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}
