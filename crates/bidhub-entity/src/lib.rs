//! # bidhub-entity
//!
//! Domain entity models for BidHub Live. Every struct in this crate is
//! either a row owned by the external store (auctions, bids,
//! notifications) or a transient value carried over a pub/sub channel
//! (chat messages, presence records). All entities derive `Debug`,
//! `Clone`, `Serialize`, and `Deserialize`.

pub mod auction;
pub mod bid;
pub mod chat;
pub mod notification;
pub mod presence;
