//! Per-user notification feeds.

pub mod feed;
pub mod router;
pub mod sink;

pub use feed::NotificationFeed;
pub use router::{NotificationRouter, NotificationSubscription};
pub use sink::NotificationSink;
