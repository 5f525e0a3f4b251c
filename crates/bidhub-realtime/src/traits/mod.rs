//! Ports to the external collaborators: the pub/sub transport and the
//! row-store. Implemented by `bridge` (in-memory) and `bidhub-database`.

pub mod store;
pub mod transport;

pub use store::AuctionStore;
pub use transport::{EventStream, RealtimeTransport};
