//! Auction rooms.

pub mod auction_room;
pub mod sink;
pub mod state;

pub use auction_room::AuctionRoom;
pub use sink::{NoopSink, RoomEventSink};
pub use state::RoomState;

/// Handle returned by `subscribe_to_auction`.
pub type RoomSubscription = AuctionRoom;
