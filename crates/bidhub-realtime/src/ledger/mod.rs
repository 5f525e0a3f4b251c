//! Bid ledger.

pub mod bid_ledger;
pub mod price;

pub use bid_ledger::BidLedger;
pub use price::PriceView;
