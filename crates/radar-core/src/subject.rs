//! Broadcast channel that replays its latest value to new subscribers.

use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::error::RefreshError;
use crate::exposure::ExposureInfo;

const CHANNEL_CAPACITY: usize = 64;

/// Item delivered to subscribers.
pub type ExposureItem = Result<ExposureInfo, RefreshError>;

#[derive(Debug, Clone)]
enum ExposureEvent {
    Update(ExposureInfo),
    RefreshFailed(RefreshError),
}

impl ExposureEvent {
    fn into_item(self) -> ExposureItem {
        match self {
            Self::Update(info) => Ok(info),
            Self::RefreshFailed(err) => Err(err),
        }
    }
}

/// Holds the latest [`ExposureInfo`] and fans updates out to subscribers.
///
/// Refresh failures are forwarded to current subscribers only; they are not
/// remembered, so late subscribers still start from the last good value.
#[derive(Debug)]
pub struct ExposureSubject {
    latest: Mutex<ExposureInfo>,
    sender: broadcast::Sender<ExposureEvent>,
}

impl ExposureSubject {
    /// Create a subject holding `initial`.
    #[must_use]
    pub fn new(initial: ExposureInfo) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: Mutex::new(initial),
            sender,
        }
    }

    /// Latest published value.
    #[must_use]
    pub fn latest(&self) -> ExposureInfo {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the latest value and forward it to subscribers.
    pub fn publish(&self, info: ExposureInfo) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.clone_from(&info);
        // No receivers is fine; the value is still kept for replay.
        let _ = self.sender.send(ExposureEvent::Update(info));
    }

    /// Forward a refresh failure to current subscribers.
    pub fn fail(&self, error: RefreshError) {
        let _latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self.sender.send(ExposureEvent::RefreshFailed(error));
    }

    /// Subscribe, starting with the latest value.
    #[must_use]
    pub fn subscribe(&self) -> ExposureSubscription {
        // Snapshot and receiver are taken under the same lock so no update
        // falls between them.
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        ExposureSubscription {
            replay: Some(latest.clone()),
            receiver: self.sender.subscribe(),
        }
    }
}

/// A subscriber's view of the exposure stream.
#[derive(Debug)]
pub struct ExposureSubscription {
    replay: Option<ExposureInfo>,
    receiver: broadcast::Receiver<ExposureEvent>,
}

impl ExposureSubscription {
    /// Waits for the next item. `None` once the subject is gone.
    pub async fn next(&mut self) -> Option<ExposureItem> {
        if let Some(info) = self.replay.take() {
            return Some(Ok(info));
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event.into_item()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Exposure subscriber lagged, skipping to newer values");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next item if one is already available.
    pub fn try_next(&mut self) -> Option<ExposureItem> {
        if let Some(info) = self.replay.take() {
            return Some(Ok(info));
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event.into_item()),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Exposure subscriber lagged, skipping to newer values");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusError;
    use crate::exposure::ExposureLevel;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_late_subscriber_sees_latest_first() {
        let subject = ExposureSubject::new(ExposureInfo::healthy());
        subject.publish(ExposureInfo::new(ExposureLevel::Exposed));

        let mut sub = subject.subscribe();
        let first = sub.try_next().unwrap().unwrap();
        assert_eq!(first.level, ExposureLevel::Exposed);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_subscriber_receives_updates_in_order() {
        let subject = ExposureSubject::new(ExposureInfo::healthy());
        let mut sub = subject.subscribe();

        subject.publish(ExposureInfo::new(ExposureLevel::Exposed));
        subject.publish(ExposureInfo::new(ExposureLevel::Infected));

        let levels: Vec<_> = std::iter::from_fn(|| sub.try_next())
            .map(|item| item.unwrap().level)
            .collect();
        assert_eq!(
            levels,
            vec![
                ExposureLevel::Healthy,
                ExposureLevel::Exposed,
                ExposureLevel::Infected
            ]
        );
    }

    #[test]
    fn test_failure_is_not_replayed() {
        let subject = ExposureSubject::new(ExposureInfo::healthy());
        let mut early = subject.subscribe();
        let _ = early.try_next();

        subject.fail(RefreshError {
            at: DateTime::<Utc>::UNIX_EPOCH,
            source: StatusError::Unavailable("offline".into()),
        });

        assert!(early.try_next().unwrap().is_err());

        let mut late = subject.subscribe();
        let replayed = late.try_next().unwrap().unwrap();
        assert_eq!(replayed.level, ExposureLevel::Healthy);
        assert!(late.try_next().is_none());
        assert_eq!(subject.latest().level, ExposureLevel::Healthy);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let subject = ExposureSubject::new(ExposureInfo::healthy());
        let mut sub = subject.subscribe();
        let _ = sub.next().await;

        for _ in 0..CHANNEL_CAPACITY + 5 {
            subject.publish(ExposureInfo::new(ExposureLevel::Exposed));
        }
        subject.publish(ExposureInfo::new(ExposureLevel::Infected));

        let mut last = None;
        while let Some(item) = sub.try_next() {
            last = Some(item.unwrap().level);
        }
        assert_eq!(last, Some(ExposureLevel::Infected));
    }

    #[tokio::test]
    async fn test_next_ends_when_subject_dropped() {
        let subject = ExposureSubject::new(ExposureInfo::healthy());
        let mut sub = subject.subscribe();
        drop(subject);

        assert!(sub.next().await.unwrap().is_ok());
        assert!(sub.next().await.is_none());
    }
}
