//! Parallel sweep over tax weights.

use crate::book::PositionBook;
use crate::error::Result;
use crate::linalg::CovarianceMatrix;
use crate::rebalance::{RebalanceParams, TaxAwareRebalancer};

/// Outcome of one rebalance in a sweep.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SweepPoint {
    pub tax_weight: f64,
    pub final_tracking_error: f64,
    pub estimated_tax_cost: f64,
    pub total_traded: f64,
}

/// Rebalance `book` once per tax weight, in parallel.
///
/// All other parameters come from `base`. The result is in input order and
/// traces the tracking-error / tax-cost trade-off. Any invalid tax weight
/// fails the whole sweep.
///
/// # Example
///
/// ```ignore
/// use allocbook::sweep::sweep_tax_weights;
///
/// let curve = sweep_tax_weights(&book, &cov, &RebalanceParams::default(), &[0.0, 0.5, 1.0, 5.0])?;
/// for p in &curve {
///     println!("{:.1}: TE {:.4}, tax {:.2}", p.tax_weight, p.final_tracking_error, p.estimated_tax_cost);
/// }
/// ```
#[cfg(feature = "parallel")]
pub fn sweep_tax_weights(
    book: &PositionBook,
    covariance: &CovarianceMatrix,
    base: &RebalanceParams,
    tax_weights: &[f64],
) -> Result<Vec<SweepPoint>> {
    use rayon::prelude::*;

    tax_weights
        .par_iter()
        .map(|&tax_weight| {
            let params = RebalanceParams {
                tax_weight,
                ..base.clone()
            };
            let result = TaxAwareRebalancer::new(params)?.rebalance(book, covariance)?;
            Ok(SweepPoint {
                tax_weight,
                final_tracking_error: result.final_tracking_error,
                estimated_tax_cost: result.estimated_tax_cost,
                total_traded: result.total_traded,
            })
        })
        .collect()
}
