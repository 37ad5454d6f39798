//! Notification fan-out.
//!
//! The indexer publishes every failure and conflict to a [`Notifier`], which
//! hands it to each registered channel subscribed to that notification name.

use std::collections::BTreeSet;
use std::sync::Arc;

use analysis_indexer_shared::{IndexerNotification, NotificationCategory, NotificationName};
use tracing::{error, info, warn};

/// Notification names a channel wants to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    All,
    Only(BTreeSet<NotificationName>),
}

impl Subscription {
    pub fn only<I: IntoIterator<Item = NotificationName>>(names: I) -> Self {
        Self::Only(names.into_iter().collect())
    }

    pub fn accepts(&self, name: NotificationName) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Only(names) => names.contains(&name),
        }
    }
}

/// A delivery mechanism for notifications (log, chat webhook, ...).
pub trait NotificationChannel: Send + Sync {
    fn subscription(&self) -> Subscription;

    /// Deliver one notification. Delivery failures are the channel's concern.
    fn send(&self, notification: &IndexerNotification);
}

/// Dispatches notifications to the channels registered at startup.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// A notifier that only writes notifications to the log.
    pub fn logging() -> Self {
        Self::new(vec![Arc::new(LoggingNotificationChannel)])
    }

    pub fn notify(&self, notification: IndexerNotification) {
        for channel in &self.channels {
            if channel.subscription().accepts(notification.name) {
                channel.send(&notification);
            }
        }
    }
}

/// Writes notifications through `tracing` at the level of their category.
pub struct LoggingNotificationChannel;

impl NotificationChannel for LoggingNotificationChannel {
    fn subscription(&self) -> Subscription {
        Subscription::All
    }

    fn send(&self, notification: &IndexerNotification) {
        match notification.category() {
            NotificationCategory::Error => {
                error!(notification = %notification.name, "{}", notification)
            }
            NotificationCategory::Warn => {
                warn!(notification = %notification.name, "{}", notification)
            }
            NotificationCategory::Info => {
                info!(notification = %notification.name, "{}", notification)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingChannel {
        subscription: Subscription,
        received: Mutex<Vec<NotificationName>>,
    }

    impl RecordingChannel {
        fn new(subscription: Subscription) -> Arc<Self> {
            Arc::new(Self {
                subscription,
                received: Mutex::new(Vec::new()),
            })
        }

        fn received(&self) -> Vec<NotificationName> {
            self.received.lock().unwrap().clone()
        }
    }

    impl NotificationChannel for RecordingChannel {
        fn subscription(&self) -> Subscription {
            self.subscription.clone()
        }

        fn send(&self, notification: &IndexerNotification) {
            self.received.lock().unwrap().push(notification.name);
        }
    }

    #[test]
    fn test_channels_receive_only_their_subscriptions() {
        let all = RecordingChannel::new(Subscription::All);
        let conflicts = RecordingChannel::new(Subscription::only([
            NotificationName::AnalysisConflict,
            NotificationName::IndexFileConflict,
        ]));
        let notifier = Notifier::new(vec![all.clone(), conflicts.clone()]);

        notifier.notify(IndexerNotification::new(NotificationName::IndexReqFailed));
        notifier.notify(
            IndexerNotification::new(NotificationName::AnalysisConflict).with("analysisId", "A1"),
        );

        assert_eq!(
            all.received(),
            vec![
                NotificationName::IndexReqFailed,
                NotificationName::AnalysisConflict
            ]
        );
        assert_eq!(conflicts.received(), vec![NotificationName::AnalysisConflict]);
    }

    #[test]
    fn test_notifier_without_channels_is_silent() {
        Notifier::default().notify(IndexerNotification::new(NotificationName::UnhandledError));
    }
}
