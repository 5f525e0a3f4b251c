//! Store implementations backed by PostgreSQL.

pub mod auction_store;
pub mod rows;

pub use auction_store::PgAuctionStore;
