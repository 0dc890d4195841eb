//! JSON request files: risk split, holdings to rebalance, end-to-end plan.

use std::path::Path;

use allocbook::{
    CovarianceMatrix, FundSelection, Holdings, Position, PositionBook, TARGET_SUM_TOLERANCE,
};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::InputRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Equity/bond risk split with optional overrides of the configured optimizer.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationRequest {
    pub target_equity: f64,
    pub target_bond: f64,
    #[serde(default)]
    pub risk_aversion: Option<f64>,
    #[serde(default)]
    pub cash_reserve: Option<f64>,
}

impl AllocationRequest {
    /// Load and validate an allocation request file.
    pub fn load(path: &Path) -> Result<Self> {
        let request: Self = read_json(path)?;
        request.validate()?;
        Ok(request)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(json)?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("target_equity", self.target_equity),
            ("target_bond", self.target_bond),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::Input(format!("{name} ({value}) must be in [0, 1]")));
            }
        }
        if self.target_equity + self.target_bond <= 0.0 {
            return Err(Error::Input("risk split is empty".into()));
        }
        Ok(())
    }
}

/// Position book plus ticker covariance, ready for the rebalancer.
///
/// `covariance` is ordered like the non-cash rows of `positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceRequest {
    pub positions: Vec<Position>,
    pub covariance: Vec<Vec<f64>>,
}

impl RebalanceRequest {
    /// Load and validate a holdings file.
    pub fn load(path: &Path) -> Result<Self> {
        let request: Self = read_json(path)?;
        request.validate()?;
        Ok(request)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(json)?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if self.positions.is_empty() {
            return Err(Error::Input("positions list is empty".into()));
        }
        let target_sum: f64 = self.positions.iter().map(|p| p.target_weight).sum();
        if (target_sum - 1.0).abs() > TARGET_SUM_TOLERANCE {
            log::warn!("target weights in request sum to {target_sum:.6}");
        }
        Ok(())
    }

    /// Build the validated book and covariance matrix.
    pub fn into_parts(self) -> Result<(PositionBook, CovarianceMatrix)> {
        let book = PositionBook::new(self.positions)?;
        let covariance = CovarianceMatrix::new(self.covariance)?;
        Ok((book, covariance))
    }
}

/// Risk split, fund selection and current holdings for a full run.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanRequest {
    pub split: AllocationRequest,
    pub funds: FundSelection,
    #[serde(default)]
    pub holdings: Holdings,
}

impl PlanRequest {
    /// Load and validate a plan file.
    pub fn load(path: &Path) -> Result<Self> {
        let request: Self = read_json(path)?;
        request.validate()?;
        Ok(request)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let request: Self = serde_json::from_str(json)?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        self.split.validate()?;

        if self.funds.is_empty() {
            return Err(Error::Input("fund selection is empty".into()));
        }
        let mut tickers = FxHashSet::default();
        for fund in self.funds.iter() {
            if !tickers.insert(&fund.ticker) {
                return Err(Error::Input(format!(
                    "ticker {} selected for more than one class",
                    fund.ticker
                )));
            }
        }

        let cash = self.holdings.total_cash();
        if !cash.is_finite() || cash < 0.0 {
            return Err(Error::Input(format!("cash balance ({cash}) must be >= 0")));
        }
        let mut held = FxHashSet::default();
        for position in &self.holdings.positions {
            if !held.insert(&position.ticker) {
                return Err(Error::Input(format!(
                    "duplicate holding: {}",
                    position.ticker
                )));
            }
        }
        Ok(())
    }
}
