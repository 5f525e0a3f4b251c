//! Auction domain entities.

pub mod model;
pub mod status;

pub use model::LiveAuction;
pub use status::AuctionStatus;
