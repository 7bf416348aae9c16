//! File-backed adapters for the collaborators the core expects the host to
//! provide.
//!
//! The tracing SDK bridge writes its latest status snapshot as JSON; the
//! localization bundle is a flat JSON string table. Alerts and decoys are
//! only logged here: presentation and networking belong to the platform.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use radar_core::{
    ExposureInfo, ExposureLevel, LocalizationError, LocalizationLoader, NotificationDispatcher,
    StatusError, TracingStatus, TracingStatusSource,
};
use tracing::info;

/// Reads [`TracingStatus`] snapshots from a JSON file.
#[derive(Debug, Clone)]
pub struct FileStatusSource {
    path: PathBuf,
}

impl FileStatusSource {
    /// Source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Modification time of the snapshot, `None` while it is missing.
    pub async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .ok()
    }
}

#[async_trait]
impl TracingStatusSource for FileStatusSource {
    async fn current_status(&self) -> Result<TracingStatus, StatusError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            StatusError::Unavailable(format!("{}: {err}", self.path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|err| StatusError::Malformed(format!("{}: {err}", self.path.display())))
    }
}

/// Loads the localization string table from a JSON file.
#[derive(Debug, Clone)]
pub struct FileLocalizationLoader {
    path: PathBuf,
}

impl FileLocalizationLoader {
    /// Loader reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LocalizationLoader for FileLocalizationLoader {
    async fn load(&self) -> Result<(), LocalizationError> {
        if !self.path.exists() {
            return Err(LocalizationError::NotFound(self.path.clone()));
        }
        let content =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| LocalizationError::Read {
                    path: self.path.clone(),
                    source,
                })?;
        let table: HashMap<String, String> = serde_json::from_str(&content)
            .map_err(|err| LocalizationError::Parse(err.to_string()))?;
        if table.is_empty() {
            return Err(LocalizationError::Empty);
        }
        Ok(())
    }
}

/// Logs alerts instead of presenting them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationDispatcher;

impl NotificationDispatcher for LogNotificationDispatcher {
    fn schedule(&self, info: &ExposureInfo) {
        let title = match info.level {
            ExposureLevel::Exposed => "Possible exposure detected",
            ExposureLevel::Infected => "Positive diagnosis registered",
            ExposureLevel::Healthy => "No exposure detected",
        };
        info!(
            level = %info.level,
            since = ?info.since,
            title,
            "Presenting exposure notification"
        );
    }
}

/// Sends decoy requests.
#[async_trait]
pub trait DecoyDispatcher: Send + Sync {
    /// Dispatches one decoy request.
    async fn dispatch(&self);
}

/// Logs decoys; transport is out of scope for the agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDecoyDispatcher;

#[async_trait]
impl DecoyDispatcher for LogDecoyDispatcher {
    async fn dispatch(&self) {
        info!("Dispatching decoy request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_core::{InfectionStatus, TrackingState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_source_reads_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(
            &path,
            r#"{
                "tracking": { "state": "active" },
                "infection": { "status": "healthy" },
                "last_sync": "2020-09-01T08:00:00Z"
            }"#,
        )
        .unwrap();

        let status = FileStatusSource::new(&path).current_status().await.unwrap();
        assert_eq!(status.tracking, TrackingState::Active);
        assert_eq!(status.infection, InfectionStatus::Healthy);
        assert!(status.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_status_source_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");

        let source = FileStatusSource::new(&path);
        assert!(matches!(
            source.current_status().await,
            Err(StatusError::Unavailable(_))
        ));

        std::fs::write(&path, "not a status").unwrap();
        assert!(matches!(
            source.current_status().await,
            Err(StatusError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_modified_tracks_snapshot_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        let source = FileStatusSource::new(&path);

        assert!(source.modified().await.is_none());
        std::fs::write(&path, "{}").unwrap();
        assert!(source.modified().await.is_some());
    }

    #[tokio::test]
    async fn test_localization_loader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("localization.json");
        let loader = FileLocalizationLoader::new(&path);

        assert!(matches!(
            loader.load().await,
            Err(LocalizationError::NotFound(_))
        ));

        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(loader.load().await, Err(LocalizationError::Empty)));

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            loader.load().await,
            Err(LocalizationError::Parse(_))
        ));

        std::fs::write(&path, r#"{ "EXPOSED_TITLE": "Posible exposición" }"#).unwrap();
        assert!(loader.load().await.is_ok());
    }
}
