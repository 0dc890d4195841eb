//! Position book: current holdings, prices, cost bases and targets.

use log::warn;
use rustc_hash::FxHashSet;

use crate::error::{Result, ValidationError};
use crate::types::{Dollars, Shares, Ticker, Weight};

/// Target weights may drift this far from 1 before a warning is logged.
pub const TARGET_SUM_TOLERANCE: f64 = 1e-4;

/// One holding in the book.
///
/// The cost basis is a single blended per-share figure; there is no lot
/// tracking.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub ticker: Ticker,
    /// Shares held (>= 0, may be fractional). For CASH this is the dollar balance.
    pub quantity: Shares,
    /// Blended cost per share.
    pub cost_basis: f64,
    /// Current price per share. CASH is always valued at 1.0.
    pub price: f64,
    /// Desired fraction of total portfolio value.
    pub target_weight: Weight,
}

impl Position {
    pub fn new(
        ticker: Ticker,
        quantity: Shares,
        cost_basis: f64,
        price: f64,
        target_weight: Weight,
    ) -> Self {
        Self {
            ticker,
            quantity,
            cost_basis,
            price,
            target_weight,
        }
    }

    /// A CASH row holding `amount` dollars.
    pub fn cash(amount: Dollars, target_weight: Weight) -> Self {
        Self::new(Ticker::cash(), amount, 1.0, 1.0, target_weight)
    }

    /// Market value at the current price.
    #[inline]
    pub fn market_value(&self) -> Dollars {
        self.quantity * self.price
    }

    /// Unrealized gain (negative for a loss) at the current price.
    #[inline]
    pub fn unrealized_gain(&self) -> Dollars {
        self.quantity * (self.price - self.cost_basis)
    }

    /// True when selling now would realize a loss (or break even).
    #[inline]
    pub fn is_at_or_below_basis(&self) -> bool {
        self.price <= self.cost_basis
    }
}

/// Validated set of non-cash positions plus exactly one CASH balance.
///
/// The book itself is immutable; rebalancing works on a copy of the
/// quantities and cash balance.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PositionBook {
    securities: Vec<Position>,
    cash: Dollars,
    cash_target: Weight,
}

impl PositionBook {
    /// Build a book from an unordered list that includes one CASH row.
    ///
    /// Non-cash positions keep their input order; that order is the
    /// covariance row order and the iteration order of every rebalancing
    /// phase.
    pub fn new(positions: Vec<Position>) -> Result<Self> {
        let mut seen = FxHashSet::default();
        let mut securities = Vec::with_capacity(positions.len().saturating_sub(1));
        let mut cash: Option<(Dollars, Weight)> = None;

        for pos in positions {
            if !seen.insert(pos.ticker.clone()) {
                if pos.ticker.is_cash() {
                    return Err(ValidationError::DuplicateCash);
                }
                return Err(ValidationError::DuplicateTicker(pos.ticker.to_string()));
            }
            validate_position(&pos)?;

            if pos.ticker.is_cash() {
                if pos.price != 1.0 {
                    warn!("CASH row priced at {}; valuing at 1.0", pos.price);
                }
                cash = Some((pos.quantity, pos.target_weight));
            } else {
                securities.push(pos);
            }
        }

        let (cash, cash_target) = cash.ok_or(ValidationError::MissingCash)?;
        if securities.is_empty() {
            return Err(ValidationError::NoSecurities);
        }

        let target_sum: f64 = securities.iter().map(|p| p.target_weight).sum::<f64>() + cash_target;
        if (target_sum - 1.0).abs() > TARGET_SUM_TOLERANCE {
            warn!("target weights sum to {target_sum:.6}, expected 1.0");
        }

        Ok(Self {
            securities,
            cash,
            cash_target,
        })
    }

    /// Non-cash positions in book order.
    pub fn securities(&self) -> &[Position] {
        &self.securities
    }

    /// Number of non-cash positions.
    #[inline]
    pub fn len(&self) -> usize {
        self.securities.len()
    }

    /// Always false: a valid book has at least one security.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    /// Starting cash balance.
    #[inline]
    pub fn cash(&self) -> Dollars {
        self.cash
    }

    /// Target weight of the CASH row.
    #[inline]
    pub fn cash_target(&self) -> Weight {
        self.cash_target
    }

    /// Starting quantities in book order.
    pub fn quantities(&self) -> Vec<Shares> {
        self.securities.iter().map(|p| p.quantity).collect()
    }

    /// Target weights of the non-cash positions in book order.
    pub fn targets(&self) -> Vec<Weight> {
        self.securities.iter().map(|p| p.target_weight).collect()
    }

    /// Find a position by ticker.
    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.securities.iter().find(|p| p.ticker.as_str() == ticker)
    }

    /// Total portfolio value for the given quantities and cash.
    pub fn total_value(&self, quantities: &[Shares], cash: Dollars) -> Dollars {
        self.market_values(quantities).iter().sum::<f64>() + cash
    }

    /// Per-security market values for the given quantities.
    pub fn market_values(&self, quantities: &[Shares]) -> Vec<Dollars> {
        self.securities
            .iter()
            .zip(quantities)
            .map(|(p, q)| q * p.price)
            .collect()
    }

    /// Current weights for the given state: `(non-cash weights, cash weight)`.
    ///
    /// An empty (zero-value) portfolio has all weights at 0.
    pub fn weights(&self, quantities: &[Shares], cash: Dollars) -> (Vec<Weight>, Weight) {
        let values = self.market_values(quantities);
        let total = values.iter().sum::<f64>() + cash;
        if total <= 0.0 {
            return (vec![0.0; values.len()], 0.0);
        }
        let weights = values.into_iter().map(|v| v / total).collect();
        (weights, cash / total)
    }

    /// Dollars each security is away from its target: `target value - current value`.
    ///
    /// Negative means overweight.
    pub fn deltas(&self, quantities: &[Shares], cash: Dollars) -> Vec<Dollars> {
        let total = self.total_value(quantities, cash);
        self.securities
            .iter()
            .zip(quantities)
            .map(|(p, q)| p.target_weight * total - q * p.price)
            .collect()
    }
}

fn validate_position(pos: &Position) -> Result<()> {
    let ticker = || pos.ticker.to_string();
    if !pos.quantity.is_finite() || pos.quantity < 0.0 {
        return Err(ValidationError::NegativeQuantity {
            ticker: ticker(),
            quantity: pos.quantity,
        });
    }
    if !pos.target_weight.is_finite() || !(0.0..=1.0).contains(&pos.target_weight) {
        return Err(ValidationError::InvalidTargetWeight {
            ticker: ticker(),
            weight: pos.target_weight,
        });
    }
    if pos.ticker.is_cash() {
        return Ok(());
    }
    if !pos.price.is_finite() || pos.price <= 0.0 {
        return Err(ValidationError::NonPositivePrice {
            ticker: ticker(),
            price: pos.price,
        });
    }
    if !pos.cost_basis.is_finite() {
        return Err(ValidationError::NonFiniteInput("cost basis"));
    }
    Ok(())
}
