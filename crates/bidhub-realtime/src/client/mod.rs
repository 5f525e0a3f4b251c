//! Consumer-facing subscription lifecycle.

pub mod adapter;

pub use adapter::ClientAdapter;
