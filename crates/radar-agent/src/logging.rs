//! Subscriber setup for the agent.
//!
//! Production writes JSON to a daily rolling file and compact lines to
//! stdout for the service journal. Development prints pretty, colored output
//! with span open/close events.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback level variable consulted when `RUST_LOG` is unset.
pub const LOG_LEVEL_VAR: &str = "RADAR_LOG_LEVEL";

/// Selects [`LogMode::Production`] when set to `production`.
pub const ENV_VAR: &str = "RADAR_ENV";

const LOG_FILE_PREFIX: &str = "radar-agent";

// Dropping a guard stops its writer thread, so they live for the process.
static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// JSON file plus compact stdout.
    Production,
    /// Pretty stdout.
    Development,
}

impl LogMode {
    /// Mode named by `RADAR_ENV`, development unless it says `production`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_name(std::env::var(ENV_VAR).ok().as_deref())
    }

    fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(name) if name.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG`, then `RADAR_LOG_LEVEL`, then `info`.
/// In production, files go to `log_dir` or the platform log directory.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a subscriber is already
/// installed.
pub fn init(mode: LogMode, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = env_filter()?;
    match mode {
        LogMode::Production => {
            let dir = log_dir.map_or_else(log_directory, Path::to_path_buf);
            init_production(filter, &dir)
        }
        LogMode::Development => init_development(filter),
    }
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = std::env::var(LOG_LEVEL_VAR).unwrap_or_else(|_| "info".to_owned());
    Ok(EnvFilter::try_new(level)?)
}

fn init_production(filter: EnvFilter, dir: &Path) -> anyhow::Result<()> {
    // A missing directory surfaces as failed writes, not as a startup error.
    let _ = std::fs::create_dir_all(dir);

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        dir,
        LOG_FILE_PREFIX,
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_current_span(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_ansi(false),
        )
        .try_init()?;

    let _ = GUARDS.set((file_guard, stdout_guard));
    Ok(())
}

fn init_development(filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .try_init()?;
    Ok(())
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/radar")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "radar")
            .map_or_else(|| PathBuf::from("logs"), |dirs| dirs.data_local_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_name() {
        assert_eq!(LogMode::from_name(Some("production")), LogMode::Production);
        assert_eq!(LogMode::from_name(Some(" Production ")), LogMode::Production);
        assert_eq!(LogMode::from_name(Some("staging")), LogMode::Development);
        assert_eq!(LogMode::from_name(None), LogMode::Development);
    }

    #[test]
    fn test_log_directory_is_absolute_on_linux() {
        let dir = log_directory();
        assert!(!dir.as_os_str().is_empty());
        #[cfg(target_os = "linux")]
        assert!(dir.is_absolute());
    }
}
