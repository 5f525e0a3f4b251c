//! Core type definitions used across the BidHub workspace.

pub mod id;

pub use id::*;
