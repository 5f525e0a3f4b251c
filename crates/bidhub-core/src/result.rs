//! Convenience result type alias for BidHub.

use crate::error::AppError;

/// A specialized `Result` type for BidHub operations.
pub type AppResult<T> = Result<T, AppError>;
