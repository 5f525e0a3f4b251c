//! Callback surface of a notification feed.

use bidhub_entity::notification::LiveNotification;

/// Receives notifications for one user.
///
/// Runs on the feed's dispatcher task after the feed already holds the
/// notification.
pub trait NotificationSink: Send + Sync + 'static {
    /// A new notification arrived.
    fn on_notification(&self, notification: &LiveNotification);

    /// The unread count changed.
    fn on_unread_count(&self, _unread: usize) {}
}
