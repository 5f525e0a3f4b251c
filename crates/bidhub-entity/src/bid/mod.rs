//! Bid domain entities.

pub mod model;

pub use model::{Bid, BidReceipt, NewBid};
