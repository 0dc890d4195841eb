//! # allocbook
//!
//! Portfolio construction and tax-aware rebalancing.
//!
//! ## Features
//!
//! - **Bucketed mean-variance**: closed-form solve per asset bucket (equity,
//!   bond) with a ridge-regularized pseudo-inverse and long-only clipping
//! - **Composition**: equity and bond buckets combined with a bounded cash
//!   reserve into one asset-class allocation that sums to 1
//! - **Position book**: validated holdings with exactly one CASH row, and
//!   covariance-weighted tracking error against targets
//! - **Tax-aware rebalancing**: three ordered greedy phases (harvest losses,
//!   sell gains only when worth the tax, buy underweights above a cash floor)
//!   with optional whole-share trading
//!
//! ## Quick Start
//!
//! ```
//! use allocbook::{
//!     AssetUniverse, CashReserveBounds, CompositionParams, FundSelection, Holdings,
//!     PositionBook, RebalanceParams, TaxAwareRebalancer, Ticker,
//! };
//!
//! // 1. Asset-class weights from a 70/30 risk split.
//! let universe = AssetUniverse::standard();
//! let params = CompositionParams { target_equity: 0.7, target_bond: 0.3, ..Default::default() };
//! let allocation = universe.compose(&params, &CashReserveBounds::default())?;
//! assert!((allocation.total() - 1.0).abs() < 1e-12);
//!
//! // 2. One fund per class, merged with an all-cash account.
//! let mut funds = FundSelection::new();
//! for (i, (class, _)) in allocation.securities().enumerate() {
//!     funds.insert(class, Ticker::new(format!("FUND{i}"))?, 50.0);
//! }
//! let book = PositionBook::assemble(&allocation, &funds, &Holdings::cash_only(100_000.0))?;
//! let cov = funds.covariance_for(&book, &universe)?;
//!
//! // 3. Trades.
//! let result = TaxAwareRebalancer::new(RebalanceParams::default())?.rebalance(&book, &cov)?;
//! assert!(result.buys().count() > 0);
//! assert!(result.cash_end_pct >= 0.02 - 1e-6);
//! # Ok::<(), allocbook::ValidationError>(())
//! ```
//!
//! ## Solving one bucket
//!
//! ```
//! use allocbook::{CovarianceMatrix, solve_bucket};
//!
//! let cov = CovarianceMatrix::diagonal(&[0.04, 0.01])?;
//! let w = solve_bucket(&[0.10, 0.05], &cov, 2.0)?;
//! assert!((w[0] - 0.7).abs() < 1e-6);
//! assert!((w[1] - 0.3).abs() < 1e-6);
//! # Ok::<(), allocbook::ValidationError>(())
//! ```
//!
//! ## Errors
//!
//! Every fallible call returns [`ValidationError`]. Bad input aborts the call
//! with no partial result. Singular covariance matrices and fully clipped
//! weight vectors are not errors; they fall back to the pseudo-inverse and
//! to equal weights respectively.

mod book;
mod compose;
mod cost_model;
mod error;
mod holdings;
mod linalg;
mod optimize;
pub mod rebalance;
mod side;
#[cfg(feature = "parallel")]
pub mod sweep;
mod tracking;
mod trade;
mod types;
mod universe;

// Re-export public API
pub use book::{Position, PositionBook, TARGET_SUM_TOLERANCE};
pub use compose::{CASH_CLASS, CashReserveBounds, CompositionParams, TargetAllocation, compose};
pub use cost_model::CostModel;
pub use error::{Result, ValidationError};
pub use holdings::{Fund, FundSelection, HeldPosition, Holdings};
pub use linalg::CovarianceMatrix;
pub use optimize::{RIDGE, normalize_long_only, solve_bucket};
pub use rebalance::{
    AllocationRow, RebalanceParams, RebalanceResult, TaxAwareRebalancer, rebalance,
};
pub use side::Side;
pub use tracking::TrackingErrorModel;
pub use trade::{Phase, Trade};
pub use types::{CASH, Dollars, Shares, Ticker, Weight};
pub use universe::{AssetClass, AssetUniverse, Bucket, BucketInputs};
