//! Exposure state reconciliation.
//!
//! Every raw [`TracingStatus`] is mapped onto an [`ExposureInfo`], compared
//! with the last persisted record, and then:
//!
//! - stamped with the detection time when it is a new `Infected` record
//! - turned into a user notification when it is a genuine change into
//!   `Exposed` (so periodic re-syncs of the same exposure stay silent)
//! - persisted unless it carries a [`TracingInactiveError`]
//! - published on the replaying stream in every case
//!
//! The read-previous / compare / persist / publish sequence runs inside one
//! critical section.
//!
//! [`TracingInactiveError`]: crate::exposure::TracingInactiveError

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::exposure::{ExposureInfo, ExposureLevel};
use crate::ports::{
    Clock, ExposureStore, LocalizationLoader, NotificationDispatcher, TracingStatusSource,
};
use crate::status::{map_status, TracingStatus};
use crate::subject::{ExposureSubject, ExposureSubscription};

/// Default time allowed for localization before a notification is dropped.
pub const DEFAULT_LOCALIZATION_TIMEOUT: Duration = Duration::from_secs(10);

/// When to notify and how long to wait for notification content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPolicy {
    /// Also notify on the first transition into `Infected`.
    pub notify_on_infected: bool,
    /// Localization must load within this time or the alert is dropped.
    pub localization_timeout: Duration,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            notify_on_infected: false,
            localization_timeout: DEFAULT_LOCALIZATION_TIMEOUT,
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Debug)]
pub struct Reconciliation {
    /// The value published on the stream.
    pub info: ExposureInfo,
    /// Whether `info` was written to the store.
    pub persisted: bool,
    /// Pending notification task; resolves to `true` once the alert was
    /// handed to the dispatcher.
    pub notification: Option<JoinHandle<bool>>,
}

/// Decisions taken for one status snapshot, before any side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    info: ExposureInfo,
    notify: bool,
    persist: bool,
}

/// Pure part of the algorithm: what to publish, notify and persist.
fn plan(
    status: &TracingStatus,
    previous: Option<&ExposureInfo>,
    now: DateTime<Utc>,
    policy: &NotificationPolicy,
) -> Plan {
    let mut info = map_status(status, previous);

    let new_infected = info.level == ExposureLevel::Infected
        && previous.map_or(true, |prev| prev.level != ExposureLevel::Infected);
    if new_infected {
        info.since = Some(now);
    } else if info.level == ExposureLevel::Infected {
        // Re-confirmation keeps the original detection time.
        info.since = previous.and_then(|prev| prev.since).or(Some(now));
    }

    let changed = previous.is_some_and(|prev| !prev.same_exposure(&info));
    let notify = info.error.is_none()
        && match info.level {
            ExposureLevel::Exposed => changed,
            ExposureLevel::Infected => policy.notify_on_infected && new_infected,
            ExposureLevel::Healthy => false,
        };

    Plan {
        persist: info.is_persistable(),
        info,
        notify,
    }
}

/// Maps tracing status onto persisted exposure state and a live stream.
pub struct ExposureReconciler {
    store: Arc<dyn ExposureStore>,
    status_source: Arc<dyn TracingStatusSource>,
    notifier: Arc<dyn NotificationDispatcher>,
    localization: Arc<dyn LocalizationLoader>,
    clock: Arc<dyn Clock>,
    policy: NotificationPolicy,
    subject: ExposureSubject,
    critical: Mutex<()>,
}

impl ExposureReconciler {
    /// Create a reconciler. The stream starts from the persisted record, or
    /// `Healthy` if there is none.
    pub fn new(
        store: Arc<dyn ExposureStore>,
        status_source: Arc<dyn TracingStatusSource>,
        notifier: Arc<dyn NotificationDispatcher>,
        localization: Arc<dyn LocalizationLoader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let initial = read_or_healthy(store.as_ref());
        Self {
            store,
            status_source,
            notifier,
            localization,
            clock,
            policy: NotificationPolicy::default(),
            subject: ExposureSubject::new(initial),
            critical: Mutex::new(()),
        }
    }

    /// Replace the notification policy.
    #[must_use]
    pub fn with_policy(mut self, policy: NotificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Live exposure stream, starting with the latest known value.
    #[must_use]
    pub fn current_exposure_info(&self) -> ExposureSubscription {
        self.subject.subscribe()
    }

    /// Last persisted record, `Healthy` if nothing was persisted.
    #[must_use]
    pub fn last_known_from_store(&self) -> ExposureInfo {
        read_or_healthy(self.store.as_ref())
    }

    /// Runs the reconciliation for a status change reported by the SDK.
    pub async fn handle_status_change(&self, status: TracingStatus) -> Reconciliation {
        self.reconcile(&status).await
    }

    /// Polls the status source and reconciles the answer.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshError`] when the status cannot be obtained. The
    /// same error is pushed once to current subscribers; the stream keeps its
    /// last good value.
    pub async fn refresh(&self) -> Result<ExposureInfo, RefreshError> {
        match self.status_source.current_status().await {
            Ok(status) => Ok(self.reconcile(&status).await.info),
            Err(source) => {
                let error = RefreshError {
                    at: self.clock.now(),
                    source,
                };
                warn!(error = %error, "Exposure refresh failed");
                self.subject.fail(error.clone());
                Err(error)
            }
        }
    }

    /// Processes status changes in arrival order until `changes` closes.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut changes: mpsc::Receiver<TracingStatus>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(status) = changes.recv().await {
                let reconciliation = self.handle_status_change(status).await;
                // The notification task keeps running once its handle is dropped.
                debug!(
                    level = %reconciliation.info.level,
                    persisted = reconciliation.persisted,
                    notifying = reconciliation.notification.is_some(),
                    "Status change reconciled"
                );
            }
            debug!("Tracing status channel closed, listener stopped");
        })
    }

    async fn reconcile(&self, status: &TracingStatus) -> Reconciliation {
        let _guard = self.critical.lock().await;

        let previous = match self.store.read() {
            Ok(previous) => previous,
            Err(err) => {
                warn!(error = %err, "Failed to read persisted exposure info, treating as absent");
                None
            }
        };
        let plan = plan(status, previous.as_ref(), self.clock.now(), &self.policy);

        if previous
            .as_ref()
            .map_or(true, |prev| prev.level != plan.info.level)
        {
            info!(
                level = %plan.info.level,
                since = ?plan.info.since,
                error = ?plan.info.error,
                "Exposure level changed"
            );
        } else {
            debug!(
                level = %plan.info.level,
                last_check = ?plan.info.last_check,
                error = ?plan.info.error,
                "Exposure level unchanged"
            );
        }

        let notification = plan
            .notify
            .then(|| self.spawn_notification(plan.info.clone()));

        let persisted = plan.persist
            && match self.store.write(&plan.info) {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "Failed to persist exposure info");
                    false
                }
            };

        self.subject.publish(plan.info.clone());

        Reconciliation {
            info: plan.info,
            persisted,
            notification,
        }
    }

    fn spawn_notification(&self, info: ExposureInfo) -> JoinHandle<bool> {
        let localization = Arc::clone(&self.localization);
        let notifier = Arc::clone(&self.notifier);
        let timeout = self.policy.localization_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, localization.load()).await {
                Ok(Ok(())) => {
                    notifier.schedule(&info);
                    info!(
                        level = %info.level,
                        since = ?info.since,
                        "Exposure notification scheduled"
                    );
                    true
                }
                Ok(Err(err)) => {
                    warn!(
                        error = %err,
                        level = %info.level,
                        "Localization unavailable, dropping exposure notification"
                    );
                    false
                }
                Err(_) => {
                    warn!(
                        timeout_ms = timeout.as_millis(),
                        level = %info.level,
                        "Localization timed out, dropping exposure notification"
                    );
                    false
                }
            }
        })
    }
}

impl std::fmt::Debug for ExposureReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposureReconciler")
            .field("policy", &self.policy)
            .field("latest", &self.subject.latest())
            .finish_non_exhaustive()
    }
}

fn read_or_healthy(store: &dyn ExposureStore) -> ExposureInfo {
    match store.read() {
        Ok(Some(info)) => info,
        Ok(None) => ExposureInfo::healthy(),
        Err(err) => {
            warn!(error = %err, "Failed to read persisted exposure info, defaulting to healthy");
            ExposureInfo::healthy()
        }
    }
}
