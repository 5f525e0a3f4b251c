//! # bidhub-realtime
//!
//! Live auction engine for BidHub. Provides:
//!
//! - Reference-counted pub/sub channels over a pluggable transport
//! - Optimistic bid validation backed by a conditional store write
//! - Auction rooms with seeded state and typed callbacks
//! - Presence tracking with heartbeats and staleness pruning
//! - Per-user notification feeds with read/unread bookkeeping
//! - In-memory transport and store for tests and single-node runs

pub mod bridge;
pub mod channel;
pub mod client;
pub mod ledger;
pub mod message;
pub mod metrics;
pub mod notification;
pub mod presence;
pub mod room;
pub mod server;
pub mod traits;

pub use bridge::{MemoryStore, MemoryTransport};
pub use channel::registry::ChannelRegistry;
pub use client::ClientAdapter;
pub use ledger::BidLedger;
pub use notification::{NotificationRouter, NotificationSink, NotificationSubscription};
pub use presence::{PresenceSession, PresenceTracker};
pub use room::{AuctionRoom, NoopSink, RoomEventSink, RoomSubscription};
pub use server::{BidOutcome, LiveAuctionService};
pub use traits::{AuctionStore, RealtimeTransport};
