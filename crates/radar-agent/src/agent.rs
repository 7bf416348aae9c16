//! Wires the core services to the host adapters and drives them.
//!
//! Four loops run until shutdown is signalled:
//! - status polling, which calls [`ExposureReconciler::refresh`] on an interval
//! - a status file watcher feeding the reconciler's change listener
//! - an exposure stream logger
//! - the decoy loop, which sleeps until the scheduled fire time, dispatches a
//!   decoy and reschedules

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use radar_core::{
    Clock, ExposureReconciler, ExposureSubscription, FakeRequestScheduler, JsonFileStore,
    RadarConfig, RadarError, SystemClock, TracingStatus, TracingStatusSource,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::host::{
    DecoyDispatcher, FileLocalizationLoader, FileStatusSource, LogDecoyDispatcher,
    LogNotificationDispatcher,
};

const STATUS_CHANGE_CAPACITY: usize = 16;

/// Loop timing taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    /// Interval between explicit refreshes.
    pub poll_interval: Duration,
    /// Interval between status file change checks.
    pub watch_interval: Duration,
    /// Whether the decoy loop runs.
    pub fake_requests_enabled: bool,
}

impl AgentSettings {
    /// Settings from the `[exposure]` and `[fake_requests]` tables.
    #[must_use]
    pub const fn from_config(config: &RadarConfig) -> Self {
        Self {
            poll_interval: config.exposure.status_poll_interval(),
            watch_interval: config.exposure.status_watch_interval(),
            fake_requests_enabled: config.fake_requests.enabled,
        }
    }
}

/// Running services and their loop settings.
pub struct Agent {
    reconciler: Arc<ExposureReconciler>,
    scheduler: Arc<FakeRequestScheduler>,
    decoys: Arc<dyn DecoyDispatcher>,
    clock: Arc<dyn Clock>,
    status_file: Option<Arc<FileStatusSource>>,
    settings: AgentSettings,
}

impl Agent {
    /// Builds the agent from configuration with file-backed adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if a path cannot be resolved or the decoy
    /// distribution is invalid.
    pub fn from_config(config: &RadarConfig) -> radar_core::Result<Self> {
        let data_dir = config.data_dir()?;
        let status_file = config.status_file()?;
        let localization_file = config.localization_file()?;
        info!(
            data_dir = %data_dir.display(),
            status_file = %status_file.display(),
            localization_file = %localization_file.display(),
            "Resolved agent paths"
        );

        let store = Arc::new(JsonFileStore::new(data_dir));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let status_source = Arc::new(FileStatusSource::new(status_file));

        let reconciler = ExposureReconciler::new(
            store.clone(),
            status_source.clone(),
            Arc::new(LogNotificationDispatcher),
            Arc::new(FileLocalizationLoader::new(localization_file)),
            clock.clone(),
        )
        .with_policy(config.exposure.notification_policy());

        let scheduler = FakeRequestScheduler::new(
            store,
            clock.clone(),
            config.fake_requests.distribution()?,
            config.fake_requests.time_unit(),
        );

        Ok(Self::new(
            Arc::new(reconciler),
            Arc::new(scheduler),
            Arc::new(LogDecoyDispatcher),
            clock,
            AgentSettings::from_config(config),
        )
        .with_status_file(status_source))
    }

    /// Assembles an agent from already-built parts. No status file is
    /// watched until [`Agent::with_status_file`] is called.
    #[must_use]
    pub fn new(
        reconciler: Arc<ExposureReconciler>,
        scheduler: Arc<FakeRequestScheduler>,
        decoys: Arc<dyn DecoyDispatcher>,
        clock: Arc<dyn Clock>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            reconciler,
            scheduler,
            decoys,
            clock,
            status_file: None,
            settings,
        }
    }

    /// Watch `source` for changes and feed them to the reconciler.
    #[must_use]
    pub fn with_status_file(mut self, source: Arc<FileStatusSource>) -> Self {
        self.status_file = Some(source);
        self
    }

    /// The reconciler driven by this agent.
    #[must_use]
    pub const fn reconciler(&self) -> &Arc<ExposureReconciler> {
        &self.reconciler
    }

    /// Runs all loops until `shutdown` flips to `true` or its sender is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the loops panicked.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut tasks = JoinSet::new();
        let mut listener = None;

        if let Some(source) = self.status_file.clone() {
            // Taken before polling starts so the first poll is not replayed
            // as a change.
            let seen = source.modified().await;
            let (changes, receiver) = mpsc::channel(STATUS_CHANGE_CAPACITY);
            listener = Some(Arc::clone(&self.reconciler).spawn_listener(receiver));
            tasks.spawn(watch_status_file(
                source,
                changes,
                self.settings.watch_interval,
                seen,
                shutdown.clone(),
            ));
        }
        tasks.spawn(log_exposure(
            self.reconciler.current_exposure_info(),
            shutdown.clone(),
        ));
        tasks.spawn(poll_status(
            self.reconciler.clone(),
            self.settings.poll_interval,
            shutdown.clone(),
        ));
        if self.settings.fake_requests_enabled {
            tasks.spawn(send_decoys(
                self.scheduler.clone(),
                self.decoys.clone(),
                self.clock.clone(),
                shutdown,
            ));
        } else {
            info!("Decoy requests disabled");
        }

        while let Some(joined) = tasks.join_next().await {
            joined.context("agent task failed")?;
        }
        // The watcher owned the sender, so the listener drains and stops.
        if let Some(listener) = listener {
            listener.await.context("status listener failed")?;
        }
        info!("Agent stopped");
        Ok(())
    }
}

/// What to check when startup fails with `err`.
#[must_use]
pub const fn startup_hint(err: &RadarError) -> &'static str {
    if err.is_config_error() {
        "check the configuration file and RADAR_* overrides"
    } else if err.is_storage_error() {
        "check that the data directory exists and is writable"
    } else {
        "see the error for details"
    }
}

/// Refreshes the exposure state every `interval`; the first poll is
/// immediate.
pub async fn poll_status(
    reconciler: Arc<ExposureReconciler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures were already logged and pushed to subscribers.
                if let Ok(info) = reconciler.refresh().await {
                    debug!(level = %info.level, "Status poll complete");
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Status polling stopped");
}

/// Sends the snapshot to `changes` whenever the status file's modification
/// time moves past `seen`.
pub async fn watch_status_file(
    source: Arc<FileStatusSource>,
    changes: mpsc::Sender<TracingStatus>,
    interval: Duration,
    mut seen: Option<SystemTime>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let modified = source.modified().await;
                if modified.is_none() || modified == seen {
                    continue;
                }
                seen = modified;
                match source.current_status().await {
                    Ok(status) => {
                        if changes.send(status).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let err = RadarError::from(err);
                        if err.is_recoverable() {
                            debug!(error = %err, "Status snapshot not readable yet");
                        } else {
                            warn!(
                                code = err.error_code(),
                                error = %err,
                                "Ignoring unusable status snapshot"
                            );
                        }
                    }
                }
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Status file watcher stopped");
}

/// Logs every item of the exposure stream.
pub async fn log_exposure(
    mut subscription: ExposureSubscription,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            item = subscription.next() => match item {
                Some(Ok(info)) => info!(
                    level = %info.level,
                    since = ?info.since,
                    last_check = ?info.last_check,
                    error = ?info.error,
                    "Exposure state"
                ),
                Some(Err(err)) => warn!(error = %err, "Exposure refresh failed"),
                None => break,
            },
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
}

/// Sends a decoy whenever the scheduled fire time passes.
pub async fn send_decoys(
    scheduler: Arc<FakeRequestScheduler>,
    decoys: Arc<dyn DecoyDispatcher>,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = scheduler.next_fire_time();
        let wait = (next - clock.now()).to_std().unwrap_or(Duration::ZERO);
        debug!(next_fire_time = %next, wait_secs = wait.as_secs(), "Waiting for next decoy");

        tokio::select! {
            () = tokio::time::sleep(wait) => {
                decoys.dispatch().await;
                let next = scheduler.reschedule_after_firing();
                info!(next_fire_time = %next, "Decoy sent");
            }
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    debug!("Decoy loop stopped");
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // An error means the sender was dropped, which also ends the loops.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
