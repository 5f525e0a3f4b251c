//! Local notification list with read/unread bookkeeping.

use std::collections::VecDeque;

use bidhub_core::types::id::NotificationId;
use bidhub_entity::notification::LiveNotification;

/// A user's notifications, newest first.
///
/// Arrivals are prepended and never re-sorted. The unread count always
/// equals the number of held notifications with `read == false`.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    items: VecDeque<LiveNotification>,
    unread: usize,
    capacity: usize,
}

impl NotificationFeed {
    /// Create an empty feed holding at most `capacity` notifications.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            unread: 0,
            capacity: capacity.max(1),
        }
    }

    /// Replace the feed with stored notifications, given newest first.
    pub fn seed(&mut self, newest_first: Vec<LiveNotification>) {
        self.items = newest_first.into_iter().take(self.capacity).collect();
        self.unread = self.items.iter().filter(|n| !n.read).count();
    }

    /// Prepend an arrival. Returns `false` if it was already held.
    pub fn receive(&mut self, notification: LiveNotification) -> bool {
        if self.items.iter().any(|n| n.id == notification.id) {
            return false;
        }
        if !notification.read {
            self.unread += 1;
        }
        self.items.push_front(notification);

        while self.items.len() > self.capacity {
            if let Some(dropped) = self.items.pop_back() {
                if !dropped.read {
                    self.unread -= 1;
                }
            }
        }
        true
    }

    /// Receive stored notifications missed while the feed was not
    /// listening, given newest first.
    ///
    /// Only rows at least as new as the newest held notification are
    /// considered, so rows trimmed by the capacity do not come back.
    /// Returns the rows actually added, oldest first.
    pub fn catch_up(&mut self, newest_first: Vec<LiveNotification>) -> Vec<LiveNotification> {
        let since = self.items.front().map(|n| n.timestamp);
        newest_first
            .into_iter()
            .rev()
            .filter(|n| since.is_none_or(|newest| n.timestamp >= newest))
            .filter(|n| self.receive(n.clone()))
            .collect()
    }

    /// Flip one notification to read. Returns whether anything changed.
    pub fn mark_as_read(&mut self, id: NotificationId) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                self.unread = self.unread.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Flip every notification to read. Returns how many changed.
    pub fn mark_all_as_read(&mut self) -> usize {
        let mut flipped = 0;
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        self.unread = 0;
        flipped
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Notifications, newest first.
    pub fn items(&self) -> Vec<LiveNotification> {
        self.items.iter().cloned().collect()
    }

    /// Number of held notifications.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the feed is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
