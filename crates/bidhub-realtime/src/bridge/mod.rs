//! In-process implementations of the transport and store ports.

pub mod memory_pubsub;
pub mod memory_store;

pub use memory_pubsub::{MemoryTransport, TransportStats};
pub use memory_store::MemoryStore;
