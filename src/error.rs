//! Validation errors for allocation and rebalancing inputs.

/// Errors returned by every fallible entry point of the engine.
///
/// All of them describe bad caller input. Numeric degeneracy (singular
/// covariance, every weight clipped to zero) is handled locally and never
/// surfaces here.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ValidationError {
    /// Risk aversion must be strictly positive and finite.
    #[error("risk aversion must be positive, got {0}")]
    NonPositiveRiskAversion(f64),

    /// Cash reserve lies outside the configured bounds.
    #[error("cash reserve {value} outside [{min}, {max}]")]
    CashReserveOutOfBounds { value: f64, min: f64, max: f64 },

    /// The cash reserve bounds themselves are nonsensical.
    #[error("invalid cash reserve bounds [{min}, {max}]")]
    InvalidCashBounds { min: f64, max: f64 },

    /// Two inputs that must agree in length do not.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A matrix row has the wrong length.
    #[error("matrix is not square: row {row} has {len} columns, expected {expected}")]
    NonSquareMatrix {
        row: usize,
        len: usize,
        expected: usize,
    },

    /// NaN or infinity in a numeric input.
    #[error("non-finite value in {0}")]
    NonFiniteInput(&'static str),

    /// The position book has no CASH row.
    #[error("position book has no CASH row")]
    MissingCash,

    /// The position book has more than one CASH row.
    #[error("position book has more than one CASH row")]
    DuplicateCash,

    /// The position book has no non-cash positions.
    #[error("position book has no securities besides CASH")]
    NoSecurities,

    /// The same ticker appears twice.
    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    /// Tickers must be non-empty.
    #[error("empty ticker")]
    EmptyTicker,

    /// Quantities must be non-negative.
    #[error("negative quantity {quantity} for {ticker}")]
    NegativeQuantity { ticker: String, quantity: f64 },

    /// Prices must be strictly positive.
    #[error("non-positive price {price} for {ticker}")]
    NonPositivePrice { ticker: String, price: f64 },

    /// Target weights must lie in [0, 1].
    #[error("target weight {weight} for {ticker} outside [0, 1]")]
    InvalidTargetWeight { ticker: String, weight: f64 },

    /// A scalar parameter is outside its allowed range.
    #[error("parameter {name} = {value} outside {range}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        range: &'static str,
    },

    /// An asset class referenced by an allocation is unknown to the caller.
    #[error("unknown asset class: {0}")]
    UnknownAssetClass(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ValidationError>;
