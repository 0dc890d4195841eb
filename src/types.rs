//! Core identifiers: Ticker and the reserved CASH symbol.

use std::fmt;

use crate::error::{Result, ValidationError};

/// The reserved ticker for the uninvested cash balance.
pub const CASH: &str = "CASH";

/// A tradable ticker symbol.
///
/// Tickers are compared case-sensitively; the only reserved value is [`CASH`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Ticker(String);

impl Ticker {
    /// Create a ticker, rejecting empty strings.
    pub fn new(symbol: impl Into<String>) -> Result<Self> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(ValidationError::EmptyTicker);
        }
        Ok(Self(symbol))
    }

    /// The CASH ticker.
    pub fn cash() -> Self {
        Self(CASH.to_string())
    }

    /// Returns true for the reserved CASH ticker.
    #[inline]
    pub fn is_cash(&self) -> bool {
        self.0 == CASH
    }

    /// The ticker as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = ValidationError;

    fn try_from(symbol: String) -> Result<Self> {
        Self::new(symbol)
    }
}

impl From<Ticker> for String {
    fn from(ticker: Ticker) -> Self {
        ticker.0
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Share count. Fractional unless integer-share mode is on.
pub type Shares = f64;

/// Dollar amount.
pub type Dollars = f64;

/// Portfolio weight in [0, 1].
pub type Weight = f64;
