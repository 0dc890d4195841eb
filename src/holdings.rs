//! Turning an asset-class allocation plus live holdings into a position book.
//!
//! The fund selection maps each asset class to one tradable ticker and its
//! current price. Holdings carry what the account already owns. Assembly
//! joins the two:
//!
//! - every allocated class becomes a position at its class weight;
//! - tickers held outside the allocation stay in the book at target 0 so the
//!   rebalancer sells them down;
//! - the cash balance, plus any CASH rows among the holdings, becomes the
//!   CASH row at the allocation's cash weight.

use rustc_hash::FxHashSet;

use crate::book::{Position, PositionBook};
use crate::compose::TargetAllocation;
use crate::error::{Result, ValidationError};
use crate::linalg::CovarianceMatrix;
use crate::types::{Dollars, Shares, Ticker};
use crate::universe::{AssetUniverse, Bucket};

/// One existing holding.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeldPosition {
    pub ticker: Ticker,
    pub quantity: Shares,
    pub cost_basis: f64,
    /// Last known price; used only when the ticker is not in the fund selection.
    pub price: f64,
}

/// Current account contents.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Holdings {
    pub cash: Dollars,
    #[cfg_attr(feature = "serde", serde(default))]
    pub positions: Vec<HeldPosition>,
}

impl Holdings {
    /// An all-cash account.
    pub fn cash_only(cash: Dollars) -> Self {
        Self {
            cash,
            positions: Vec::new(),
        }
    }

    /// Cash balance plus any CASH rows listed among the positions.
    pub fn total_cash(&self) -> Dollars {
        self.cash
            + self
                .positions
                .iter()
                .filter(|p| p.ticker.is_cash())
                .map(|p| p.quantity)
                .sum::<Dollars>()
    }

    pub fn get(&self, ticker: &Ticker) -> Option<&HeldPosition> {
        self.positions.iter().find(|p| &p.ticker == ticker)
    }
}

/// Fund chosen to represent one asset class.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fund {
    pub asset_class: String,
    pub ticker: Ticker,
    pub price: f64,
}

/// Asset class -> fund mapping, one fund per class.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FundSelection {
    funds: Vec<Fund>,
}

impl FundSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the fund for `asset_class`.
    pub fn insert(
        &mut self,
        asset_class: impl Into<String>,
        ticker: Ticker,
        price: f64,
    ) -> &mut Self {
        let asset_class = asset_class.into();
        self.funds.retain(|f| f.asset_class != asset_class);
        self.funds.push(Fund {
            asset_class,
            ticker,
            price,
        });
        self
    }

    pub fn get(&self, asset_class: &str) -> Option<&Fund> {
        self.funds.iter().find(|f| f.asset_class == asset_class)
    }

    /// Reverse lookup: which class a ticker represents.
    pub fn class_of(&self, ticker: &Ticker) -> Option<&str> {
        self.funds
            .iter()
            .find(|f| &f.ticker == ticker)
            .map(|f| f.asset_class.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fund> {
        self.funds.iter()
    }

    pub fn len(&self) -> usize {
        self.funds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funds.is_empty()
    }

    /// Ticker covariance for `book`, derived from the class covariance.
    ///
    /// Tickers with no class in this selection get the universe's mean
    /// equity variance on the diagonal and zero covariance elsewhere.
    pub fn covariance_for(
        &self,
        book: &PositionBook,
        universe: &AssetUniverse,
    ) -> Result<CovarianceMatrix> {
        let indices = book
            .securities()
            .iter()
            .map(|p| match self.class_of(&p.ticker) {
                Some(id) => universe
                    .class(id)
                    .map(|c| Some(c.index))
                    .ok_or_else(|| ValidationError::UnknownAssetClass(id.to_string())),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        let fallback = mean_equity_variance(universe);
        let cov = universe.covariance();
        let rows = indices
            .iter()
            .enumerate()
            .map(|(i, ci)| {
                indices
                    .iter()
                    .enumerate()
                    .map(|(j, cj)| match (ci, cj) {
                        (Some(a), Some(b)) => cov.get(*a, *b),
                        _ if i == j => fallback,
                        _ => 0.0,
                    })
                    .collect()
            })
            .collect();
        CovarianceMatrix::new(rows)
    }
}

impl PositionBook {
    /// Build a book from a class allocation, its fund selection and current holdings.
    ///
    /// A held ticker keeps its cost basis; a new one is costed at the
    /// selection price.
    pub fn assemble(
        allocation: &TargetAllocation,
        funds: &FundSelection,
        holdings: &Holdings,
    ) -> Result<Self> {
        let mut positions = Vec::with_capacity(allocation.len() + holdings.positions.len() + 1);
        let mut allocated: FxHashSet<&Ticker> = FxHashSet::default();

        for (class, weight) in allocation.securities() {
            let fund = funds
                .get(class)
                .ok_or_else(|| ValidationError::UnknownAssetClass(class.to_string()))?;
            let held = holdings.get(&fund.ticker);
            positions.push(Position::new(
                fund.ticker.clone(),
                held.map_or(0.0, |h| h.quantity),
                held.map_or(fund.price, |h| h.cost_basis),
                fund.price,
                weight,
            ));
            allocated.insert(&fund.ticker);
        }

        for held in &holdings.positions {
            if held.ticker.is_cash() || allocated.contains(&held.ticker) {
                continue;
            }
            positions.push(Position::new(
                held.ticker.clone(),
                held.quantity,
                held.cost_basis,
                held.price,
                0.0,
            ));
        }

        positions.push(Position::cash(holdings.total_cash(), allocation.cash_weight()));
        PositionBook::new(positions)
    }
}

fn mean_equity_variance(universe: &AssetUniverse) -> f64 {
    let variances: Vec<f64> = universe
        .classes()
        .iter()
        .filter(|c| c.bucket == Bucket::Equity)
        .map(|c| universe.covariance().get(c.index, c.index))
        .collect();
    if variances.is_empty() {
        return 0.0;
    }
    variances.iter().sum::<f64>() / variances.len() as f64
}
