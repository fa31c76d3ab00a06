use thiserror::Error;

use crate::types::ItemId;

/// Failures of the rating math. Callers must not persist anything when one occurs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RatingError {
    #[error("invalid rating state: {field} = {value}")]
    InvalidRating { field: &'static str, value: f64 },

    #[error("rating update produced a non-finite {quantity}")]
    NonFinite { quantity: &'static str },

    #[error("volatility solver did not converge within {iterations} iterations")]
    NonConvergence { iterations: usize },
}

/// Failures of library-level operations on the ranking engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LibraryError {
    #[error("unknown item ID: {0}")]
    UnknownItem(ItemId),

    #[error("duplicate item ID: {0}")]
    DuplicateItem(ItemId),

    #[error("item {0} cannot be compared with itself")]
    SelfComparison(ItemId),

    #[error("comparison {0} not found")]
    UnknownComparison(u64),

    #[error("comparison {0} was followed by later comparisons of the same items; undo those first")]
    StaleReceipt(u64),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error(transparent)]
    Rating(#[from] RatingError),
}
