//! Combine per-bucket optimizations into one target allocation.
//!
//! Equity and bond buckets are solved independently, scaled by the risk
//! split, and joined with a fixed cash reserve that is carved out of the bond
//! side.

use crate::error::{Result, ValidationError};
use crate::optimize::solve_bucket;
use crate::universe::{AssetUniverse, Bucket, BucketInputs};

/// Risk splits above `1 + SPLIT_TOLERANCE` are rescaled to sum to 1.
const SPLIT_TOLERANCE: f64 = 1e-4;

/// Totals this close to 1 are float drift and left alone.
const RENORMALIZE_TOLERANCE: f64 = 1e-12;

/// Default id for the cash entry of an allocation.
pub const CASH_CLASS: &str = "cash";

/// Allowed range for the cash reserve.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CashReserveBounds {
    pub min: f64,
    pub max: f64,
}

impl CashReserveBounds {
    /// Check `0 <= min <= max <= 1`.
    pub fn validate(&self) -> Result<()> {
        let ok = self.min.is_finite()
            && self.max.is_finite()
            && self.min >= 0.0
            && self.min <= self.max
            && self.max <= 1.0;
        if !ok {
            return Err(ValidationError::InvalidCashBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Reject a cash reserve outside `[min, max]`.
    pub fn check(&self, cash_reserve: f64) -> Result<()> {
        self.validate()?;
        if !cash_reserve.is_finite() || cash_reserve < self.min || cash_reserve > self.max {
            return Err(ValidationError::CashReserveOutOfBounds {
                value: cash_reserve,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for CashReserveBounds {
    fn default() -> Self {
        Self {
            min: 0.02,
            max: 0.05,
        }
    }
}

/// Inputs to a composition: the risk split, risk aversion, and cash reserve.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompositionParams {
    /// Fraction of the portfolio targeted at equities.
    pub target_equity: f64,
    /// Fraction of the portfolio targeted at bonds, cash reserve included.
    pub target_bond: f64,
    /// Mean-variance risk aversion (lambda); higher is more conservative.
    pub risk_aversion: f64,
    /// Fraction held as cash.
    pub cash_reserve: f64,
}

impl CompositionParams {
    /// Validate against the given cash bounds.
    pub fn validate(&self, bounds: &CashReserveBounds) -> Result<()> {
        if !self.risk_aversion.is_finite() || self.risk_aversion <= 0.0 {
            return Err(ValidationError::NonPositiveRiskAversion(self.risk_aversion));
        }
        for (name, value) in [
            ("target_equity", self.target_equity),
            ("target_bond", self.target_bond),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::InvalidParameter {
                    name,
                    value,
                    range: "[0, 1]",
                });
            }
        }
        bounds.check(self.cash_reserve)
    }
}

impl Default for CompositionParams {
    fn default() -> Self {
        Self {
            target_equity: 0.6,
            target_bond: 0.4,
            risk_aversion: 1.0,
            cash_reserve: 0.05,
        }
    }
}

/// Asset-class weights summing to 1, in composition order
/// (equity classes, bond classes, cash).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetAllocation {
    weights: Vec<(String, f64)>,
    cash_id: Option<String>,
}

impl TargetAllocation {
    /// Wrap precomputed weights. `cash_id` names the entry that is cash, if any.
    pub fn new(weights: Vec<(String, f64)>, cash_id: Option<String>) -> Self {
        Self { weights, cash_id }
    }

    /// Weight for an asset class, if present.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.weights.iter().find(|(k, _)| k == id).map(|(_, w)| *w)
    }

    /// Iterate over `(asset class, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, w)| (k.as_str(), *w))
    }

    /// Non-cash entries only.
    pub fn securities(&self) -> impl Iterator<Item = (&str, f64)> {
        self.iter()
            .filter(move |(k, _)| self.cash_id.as_deref() != Some(*k))
    }

    /// Weight assigned to cash (0 when the allocation has no cash entry).
    pub fn cash_weight(&self) -> f64 {
        self.cash_id
            .as_deref()
            .and_then(|id| self.get(id))
            .unwrap_or(0.0)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Compose equity and bond buckets with a cash reserve into one allocation.
///
/// The cash entry is emitted under [`CASH_CLASS`] with weight exactly
/// `cash_reserve` whenever the other weights already sum to `1 - cash_reserve`.
pub fn compose(
    equity: &BucketInputs,
    bond: &BucketInputs,
    params: &CompositionParams,
    bounds: &CashReserveBounds,
) -> Result<TargetAllocation> {
    compose_inner(equity, bond, Some(CASH_CLASS), params, bounds)
}

impl AssetUniverse {
    /// Compose this universe's equity and bond buckets.
    ///
    /// The cash reserve is carved out of the bond bucket only when the
    /// universe has a cash class; otherwise it is ignored.
    pub fn compose(
        &self,
        params: &CompositionParams,
        bounds: &CashReserveBounds,
    ) -> Result<TargetAllocation> {
        let equity = self.bucket_inputs(Bucket::Equity);
        let bond = self.bucket_inputs(Bucket::Bond);
        let cash_id = self.cash_class().map(|c| c.id.as_str());
        compose_inner(&equity, &bond, cash_id, params, bounds)
    }
}

fn compose_inner(
    equity: &BucketInputs,
    bond: &BucketInputs,
    cash_id: Option<&str>,
    params: &CompositionParams,
    bounds: &CashReserveBounds,
) -> Result<TargetAllocation> {
    params.validate(bounds)?;
    let lambda = params.risk_aversion;
    let cash = params.cash_reserve;

    let w_eq = solve_bucket(&equity.expected_returns, &equity.covariance, lambda)?;
    let w_bond = solve_bucket(&bond.expected_returns, &bond.covariance, lambda)?;

    let mut target_equity = params.target_equity;
    let mut target_bond = params.target_bond;
    let split = target_equity + target_bond;
    if split > 1.0 + SPLIT_TOLERANCE {
        target_equity /= split;
        target_bond /= split;
    }
    let carve_out = if cash_id.is_some() { cash } else { 0.0 };
    let bond_ex_cash = (target_bond - carve_out).max(0.0);

    let mut weights: Vec<(String, f64)> = Vec::with_capacity(equity.len() + bond.len() + 1);
    weights.extend(
        equity
            .ids
            .iter()
            .zip(&w_eq)
            .map(|(id, w)| (id.clone(), w * target_equity)),
    );
    weights.extend(
        bond.ids
            .iter()
            .zip(&w_bond)
            .map(|(id, w)| (id.clone(), w * bond_ex_cash)),
    );
    if let Some(id) = cash_id {
        weights.push((id.to_string(), cash));
    }

    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total > 0.0 && (total - 1.0).abs() > RENORMALIZE_TOLERANCE {
        for (_, w) in &mut weights {
            *w /= total;
        }
    }

    Ok(TargetAllocation {
        weights,
        cash_id: cash_id.map(str::to_string),
    })
}
