//! Pub/sub channel system.

pub mod channel;
pub mod handle;
pub mod registry;
pub mod subscription;
pub mod types;

pub use channel::Inbound;
pub use handle::ChannelHandle;
pub use registry::ChannelRegistry;
pub use subscription::{DeliveryGate, Disposer, Subscription};
pub use types::ChannelType;
