//! Participant presence: local rosters, room/global tracking, heartbeats.

pub mod heartbeat;
pub mod roster;
pub mod session;
pub mod tracker;

pub use roster::PresenceRoster;
pub use session::PresenceSession;
pub use tracker::PresenceTracker;
