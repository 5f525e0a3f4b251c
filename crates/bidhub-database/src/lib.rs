//! # bidhub-database
//!
//! PostgreSQL connection management, migrations, and the persistent
//! [`AuctionStore`](bidhub_realtime::AuctionStore) implementation.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use repositories::PgAuctionStore;
