//! Tax-aware rebalancing.
//!
//! Three ordered phases run over a private copy of the book's
//! `(quantities, cash)` state:
//!
//! 1. **Sell losses**: every overweight position at or below its cost basis
//!    is sold down to target, in book order, regardless of tax weight.
//! 2. **Sell gains if beneficial**: overweight positions with unrealized
//!    gains are scored once by `marginal TE² per dollar + tax_weight *
//!    marginal tax per dollar` and sold in ascending score order while the
//!    score is negative. Scores are not recomputed after each sale.
//! 3. **Buy underweights**: cash above the `min_cash_pct` floor is spent on
//!    underweight positions, either proportionally in one pass (fractional
//!    shares) or one share at a time (integer shares).
//!
//! # Example
//!
//! ```
//! use allocbook::{CovarianceMatrix, Position, PositionBook, RebalanceParams, TaxAwareRebalancer, Ticker};
//!
//! let book = PositionBook::new(vec![
//!     Position::new(Ticker::new("STOCK1")?, 100.0, 50.0, 55.0, 0.3),
//!     Position::new(Ticker::new("STOCK2")?, 50.0, 40.0, 45.0, 0.6),
//!     Position::cash(1000.0, 0.1),
//! ])?;
//! let cov = CovarianceMatrix::new(vec![vec![0.02, 0.01], vec![0.01, 0.03]])?;
//!
//! let result = TaxAwareRebalancer::new(RebalanceParams::default())?.rebalance(&book, &cov)?;
//! assert!(result.final_tracking_error <= result.initial_tracking_error);
//! assert!(result.cash_end_pct >= 0.02 - 1e-6);
//! # Ok::<(), allocbook::ValidationError>(())
//! ```

mod result;

pub use result::{AllocationRow, RebalanceResult};

use log::{debug, warn};

use crate::book::PositionBook;
use crate::error::{Result, ValidationError};
use crate::linalg::CovarianceMatrix;
use crate::tracking::TrackingErrorModel;
use crate::trade::{Phase, Trade};
use crate::types::{Dollars, Shares};

/// Default iteration cap for the integer-share buy loop.
pub const DEFAULT_MAX_BUY_ITERATIONS: usize = 5000;

/// Dollar deltas smaller than this fraction of portfolio value count as zero.
const DUST: f64 = 1e-9;

/// Slack applied before flooring share counts in integer mode.
const FLOOR_SLACK: f64 = 1e-9;

/// Rebalancer knobs.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceParams {
    /// Weight of the tax term against tracking error (>= 0).
    pub tax_weight: f64,
    /// Long-term capital gains rate in [0, 1].
    pub ltcg_rate: f64,
    /// Trade whole shares only.
    pub integer_shares: bool,
    /// Cash floor as a fraction of portfolio value, in [0, 1).
    pub min_cash_pct: f64,
    /// Iteration cap for the integer-share buy loop.
    pub max_buy_iterations: usize,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self {
            tax_weight: 1.0,
            ltcg_rate: 0.15,
            integer_shares: false,
            min_cash_pct: 0.02,
            max_buy_iterations: DEFAULT_MAX_BUY_ITERATIONS,
        }
    }
}

impl RebalanceParams {
    pub fn validate(&self) -> Result<()> {
        if !self.tax_weight.is_finite() || self.tax_weight < 0.0 {
            return Err(ValidationError::InvalidParameter {
                name: "tax_weight",
                value: self.tax_weight,
                range: "[0, inf)",
            });
        }
        if !(0.0..=1.0).contains(&self.ltcg_rate) {
            return Err(ValidationError::InvalidParameter {
                name: "ltcg_rate",
                value: self.ltcg_rate,
                range: "[0, 1]",
            });
        }
        if !(0.0..1.0).contains(&self.min_cash_pct) {
            return Err(ValidationError::InvalidParameter {
                name: "min_cash_pct",
                value: self.min_cash_pct,
                range: "[0, 1)",
            });
        }
        if self.max_buy_iterations == 0 {
            return Err(ValidationError::InvalidParameter {
                name: "max_buy_iterations",
                value: 0.0,
                range: "[1, inf)",
            });
        }
        Ok(())
    }
}

/// Greedy three-phase rebalancer.
///
/// Stateless between calls; concurrent use from several threads is fine.
#[derive(Clone, Debug)]
pub struct TaxAwareRebalancer {
    params: RebalanceParams,
}

impl TaxAwareRebalancer {
    /// Validates the parameters up front.
    pub fn new(params: RebalanceParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &RebalanceParams {
        &self.params
    }

    /// Compute the trade list that moves `book` toward its targets.
    ///
    /// `covariance` is the ticker covariance, aligned with the book's
    /// non-cash positions.
    pub fn rebalance(
        &self,
        book: &PositionBook,
        covariance: &CovarianceMatrix,
    ) -> Result<RebalanceResult> {
        let model = TrackingErrorModel::new(book, covariance)?;
        let mut state = State::new(model);

        let initial_te = model.tracking_error(&state.quantities, state.cash);
        let cash_start_pct = pct(book.cash(), state.total());

        self.sell_losses(&mut state);
        self.sell_gains_if_beneficial(&mut state);
        let stopped_early = if self.params.integer_shares {
            self.buy_underweights_integer(&mut state)
        } else {
            self.buy_underweights_fractional(&mut state);
            false
        };

        let final_te = model.tracking_error(&state.quantities, state.cash);
        let realized_net_gains: Dollars = state.trades.iter().map(|t| t.realized_gain).sum();
        let total_traded: Dollars = state.trades.iter().map(Trade::notional).sum();
        let allocation = AllocationRow::table(book, &state.quantities, state.cash);
        let cash_end_pct = pct(state.cash, state.total());

        Ok(RebalanceResult {
            initial_tracking_error: initial_te,
            final_tracking_error: final_te,
            realized_net_gains,
            estimated_tax_cost: self.params.ltcg_rate * realized_net_gains,
            cash_start_pct,
            cash_end_pct,
            total_traded,
            trades: state.trades,
            allocation,
            stopped_early,
        })
    }

    fn sell_losses(&self, state: &mut State<'_>) {
        let before = state.trades.len();
        for i in 0..state.len() {
            let pos = &state.book().securities()[i];
            if pos.price > pos.cost_basis {
                continue;
            }
            let delta = state.delta(i);
            if delta < -state.dust() {
                state.sell(i, -delta, self.params.integer_shares, Phase::SellLosses);
            }
        }
        debug!("sell losses: {} trades", state.trades.len() - before);
    }

    fn sell_gains_if_beneficial(&self, state: &mut State<'_>) {
        let before = state.trades.len();
        let mut candidates: Vec<(usize, f64)> = (0..state.len())
            .filter(|&i| {
                let pos = &state.book().securities()[i];
                pos.price > pos.cost_basis && state.delta(i) < -state.dust()
            })
            .map(|i| (i, self.sale_objective(state, i)))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        for (i, objective) in candidates {
            if objective >= 0.0 {
                break;
            }
            let delta = state.delta(i);
            if delta < -state.dust() {
                state.sell(i, -delta, self.params.integer_shares, Phase::SellGains);
            }
        }
        debug!("sell gains: {} trades", state.trades.len() - before);
    }

    /// Objective change per dollar sold of security `i` at the current state.
    fn sale_objective(&self, state: &State<'_>, i: usize) -> f64 {
        let pos = &state.book().securities()[i];
        let te = state
            .model
            .marginal_sale_per_dollar(&state.quantities, state.cash, i);
        let tax = self.params.ltcg_rate * (pos.price - pos.cost_basis) / pos.price;
        te + self.params.tax_weight * tax
    }

    fn buy_underweights_fractional(&self, state: &mut State<'_>) {
        let spendable = state.spendable(self.params.min_cash_pct);
        let dust = state.dust();
        let under: Vec<Dollars> = (0..state.len())
            .map(|i| {
                let d = state.delta(i);
                if d > dust { d } else { 0.0 }
            })
            .collect();
        let total_under: Dollars = under.iter().sum();
        if spendable <= 0.0 || total_under <= 0.0 {
            debug!("buy underweights: nothing to buy");
            return;
        }

        // All cash above the floor goes out, split by underweight dollars.
        for (i, u) in under.into_iter().enumerate() {
            if u <= 0.0 {
                continue;
            }
            let price = state.book().securities()[i].price;
            state.buy(i, spendable * u / total_under / price);
        }
        debug!("buy underweights: spent {spendable:.2} across {total_under:.2} underweight");
    }

    /// Returns true when the iteration cap cut the loop short.
    fn buy_underweights_integer(&self, state: &mut State<'_>) -> bool {
        let mut bought: Vec<Shares> = vec![0.0; state.len()];
        let mut iterations = 0;
        let mut stopped_early = false;

        while let Some(i) = state.best_single_share(self.params.min_cash_pct) {
            if iterations == self.params.max_buy_iterations {
                warn!(
                    "integer buy loop hit {} iterations with purchases remaining; stopping early",
                    self.params.max_buy_iterations
                );
                stopped_early = true;
                break;
            }
            let price = state.book().securities()[i].price;
            state.quantities[i] += 1.0;
            state.cash -= price;
            bought[i] += 1.0;
            iterations += 1;
        }

        for (i, shares) in bought.into_iter().enumerate() {
            if shares > 0.0 {
                let pos = &state.book().securities()[i];
                state.trades.push(Trade::buy(pos.ticker.clone(), shares, pos.price));
            }
        }
        debug!("buy underweights: {iterations} single-share purchases");
        stopped_early
    }
}

/// Convenience wrapper: validate `params` and run one rebalance.
pub fn rebalance(
    book: &PositionBook,
    covariance: &CovarianceMatrix,
    params: RebalanceParams,
) -> Result<RebalanceResult> {
    TaxAwareRebalancer::new(params)?.rebalance(book, covariance)
}

/// Mutable working copy of the book.
struct State<'a> {
    model: TrackingErrorModel<'a>,
    quantities: Vec<Shares>,
    cash: Dollars,
    trades: Vec<Trade>,
}

impl<'a> State<'a> {
    fn new(model: TrackingErrorModel<'a>) -> Self {
        let book = model.book();
        Self {
            model,
            quantities: book.quantities(),
            cash: book.cash(),
            trades: Vec::new(),
        }
    }

    #[inline]
    fn book(&self) -> &'a PositionBook {
        self.model.book()
    }

    #[inline]
    fn len(&self) -> usize {
        self.quantities.len()
    }

    fn total(&self) -> Dollars {
        self.book().total_value(&self.quantities, self.cash)
    }

    fn dust(&self) -> Dollars {
        DUST * self.total()
    }

    /// `target value - current value` for security `i`.
    fn delta(&self, i: usize) -> Dollars {
        let pos = &self.book().securities()[i];
        pos.target_weight * self.total() - self.quantities[i] * pos.price
    }

    fn spendable(&self, min_cash_pct: f64) -> Dollars {
        (self.cash - min_cash_pct * self.total()).max(0.0)
    }

    /// Sell up to `amount` dollars of security `i`, capped at the full position.
    fn sell(&mut self, i: usize, amount: Dollars, integer: bool, phase: Phase) {
        let pos = &self.book().securities()[i];
        let held = self.quantities[i];
        let mut shares = if amount >= held * pos.price {
            held
        } else {
            amount / pos.price
        };
        if integer {
            shares = (shares + FLOOR_SLACK).floor().min(held.floor());
        }
        if shares <= 0.0 {
            return;
        }

        let trade = Trade::sell(pos.ticker.clone(), shares, pos.price, pos.cost_basis, phase);
        self.quantities[i] -= shares;
        self.cash += trade.proceeds;
        self.trades.push(trade);
    }

    fn buy(&mut self, i: usize, shares: Shares) {
        if shares <= 0.0 {
            return;
        }
        let pos = &self.book().securities()[i];
        let trade = Trade::buy(pos.ticker.clone(), shares, pos.price);
        self.quantities[i] += shares;
        self.cash += trade.proceeds;
        self.trades.push(trade);
    }

    /// Underweight, affordable security with the largest weight gap per
    /// dollar of share price.
    fn best_single_share(&self, min_cash_pct: f64) -> Option<usize> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        let spendable = self.spendable(min_cash_pct);
        let dust = DUST * total;

        let mut best: Option<(usize, f64)> = None;
        for (i, pos) in self.book().securities().iter().enumerate() {
            if pos.price > spendable || self.delta(i) <= dust {
                continue;
            }
            let current = self.quantities[i] * pos.price / total;
            let gap = (pos.target_weight - current) / pos.price;
            if best.is_none_or(|(_, g)| gap > g) {
                best = Some((i, gap));
            }
        }
        best.map(|(i, _)| i)
    }
}

fn pct(amount: Dollars, total: Dollars) -> f64 {
    if total > 0.0 { amount / total } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Position;
    use crate::side::Side;
    use crate::types::Ticker;

    fn t(s: &str) -> Ticker {
        Ticker::new(s).unwrap()
    }

    fn scenario_book() -> PositionBook {
        PositionBook::new(vec![
            Position::new(t("STOCK1"), 100.0, 50.0, 55.0, 0.3),
            Position::new(t("STOCK2"), 50.0, 40.0, 45.0, 0.6),
            Position::cash(1000.0, 0.1),
        ])
        .unwrap()
    }

    fn scenario_cov() -> CovarianceMatrix {
        CovarianceMatrix::new(vec![vec![0.02, 0.01], vec![0.01, 0.03]]).unwrap()
    }

    #[test]
    fn params_validation() {
        assert!(RebalanceParams::default().validate().is_ok());
        let bad = [
            RebalanceParams { tax_weight: -0.1, ..Default::default() },
            RebalanceParams { ltcg_rate: 1.5, ..Default::default() },
            RebalanceParams { min_cash_pct: 1.0, ..Default::default() },
            RebalanceParams { max_buy_iterations: 0, ..Default::default() },
            RebalanceParams { tax_weight: f64::NAN, ..Default::default() },
        ];
        for p in bad {
            assert!(matches!(
                TaxAwareRebalancer::new(p),
                Err(ValidationError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn scenario_fractional() {
        let result = rebalance(&scenario_book(), &scenario_cov(), RebalanceParams::default()).unwrap();

        // STOCK1's gain is taxed more than selling it helps, so only buys happen.
        assert_eq!(result.trades.len(), 1);
        let buy = &result.trades[0];
        assert_eq!(buy.ticker.as_str(), "STOCK2");
        assert_eq!(buy.side, Side::Buy);
        // spendable = 1000 - 0.02 * 8750 = 825
        assert!((buy.proceeds + 825.0).abs() < 1e-9);
        assert!((result.cash_end_pct - 0.02).abs() < 1e-12);
        assert!(result.final_tracking_error <= result.initial_tracking_error);
        assert_eq!(result.realized_net_gains, 0.0);
        assert!(!result.stopped_early);
    }

    #[test]
    fn low_tax_weight_sells_gains() {
        let params = RebalanceParams {
            tax_weight: 0.0,
            ..Default::default()
        };
        let result = rebalance(&scenario_book(), &scenario_cov(), params).unwrap();
        let sell = &result.trades[0];
        assert_eq!(sell.ticker.as_str(), "STOCK1");
        assert_eq!(sell.phase, Phase::SellGains);
        // Overweight by 5500 - 0.3 * 8750 = 2875 dollars.
        assert!((sell.proceeds - 2875.0).abs() < 1e-9);
        assert!((result.realized_net_gains - 2875.0 / 55.0 * 5.0).abs() < 1e-9);

        // 3875 cash less the 175 floor all goes to STOCK2, 700 past its target.
        let buy = &result.trades[1];
        assert_eq!(buy.ticker.as_str(), "STOCK2");
        assert!((buy.proceeds + 3700.0).abs() < 1e-9);
        assert!((result.cash_end_pct - 0.02).abs() < 1e-12);
        assert!(result.final_tracking_error < result.initial_tracking_error);
    }

    #[test]
    fn losses_sold_before_gains() {
        let book = PositionBook::new(vec![
            Position::new(t("GAIN"), 100.0, 10.0, 20.0, 0.2),
            Position::new(t("LOSS"), 100.0, 30.0, 20.0, 0.2),
            Position::new(t("UNDER"), 0.0, 20.0, 20.0, 0.5),
            Position::cash(0.0, 0.1),
        ])
        .unwrap();
        let cov = CovarianceMatrix::diagonal(&[0.04, 0.04, 0.04]).unwrap();
        let params = RebalanceParams {
            tax_weight: 0.0,
            ..Default::default()
        };
        let result = rebalance(&book, &cov, params).unwrap();

        assert_eq!(result.trades[0].ticker.as_str(), "LOSS");
        assert_eq!(result.trades[0].phase, Phase::SellLosses);
        assert!(result.trades[0].realized_gain < 0.0);
        assert_eq!(result.trades[1].ticker.as_str(), "GAIN");
        assert_eq!(result.trades[1].phase, Phase::SellGains);
    }

    #[test]
    fn losses_sold_even_with_huge_tax_weight() {
        let book = PositionBook::new(vec![
            Position::new(t("LOSS"), 100.0, 30.0, 20.0, 0.2),
            Position::new(t("OTHER"), 0.0, 20.0, 20.0, 0.7),
            Position::cash(0.0, 0.1),
        ])
        .unwrap();
        let cov = CovarianceMatrix::diagonal(&[0.04, 0.04]).unwrap();
        let params = RebalanceParams {
            tax_weight: 1e6,
            ..Default::default()
        };
        let result = rebalance(&book, &cov, params).unwrap();
        assert_eq!(result.trades[0].phase, Phase::SellLosses);
        assert!((result.trades[0].proceeds - 1600.0).abs() < 1e-9);
        assert!(result.estimated_tax_cost < 0.0);
    }

    #[test]
    fn at_target_is_a_no_op() {
        let book = PositionBook::new(vec![
            Position::new(t("A"), 30.0, 5.0, 10.0, 0.3),
            Position::new(t("B"), 60.0, 15.0, 10.0, 0.6),
            Position::cash(100.0, 0.1),
        ])
        .unwrap();
        let result = rebalance(&book, &scenario_cov(), RebalanceParams::default()).unwrap();
        assert!(result.trades.is_empty(), "{:?}", result.trades);
        assert!(result.initial_tracking_error < 1e-9);
        assert!(result.final_tracking_error < 1e-9);
        assert_eq!(result.total_traded, 0.0);
    }

    #[test]
    fn integer_mode_trades_whole_shares() {
        let params = RebalanceParams {
            integer_shares: true,
            ..Default::default()
        };
        let result = rebalance(&scenario_book(), &scenario_cov(), params).unwrap();
        assert!(!result.trades.is_empty());
        for trade in &result.trades {
            assert_eq!(trade.shares, trade.shares.floor());
        }
        // Same-ticker single-share purchases are merged.
        let buys = result.trades.iter().filter(|t| t.side == Side::Buy).count();
        assert_eq!(buys, 1);
        // 825 spendable / 45 per share -> 18 shares
        assert_eq!(result.trades[0].shares, 18.0);
        assert!(result.cash_end_pct >= 0.02 - 1e-6);
        assert!(!result.stopped_early);
    }

    #[test]
    fn integer_loop_cap_sets_flag() {
        let params = RebalanceParams {
            integer_shares: true,
            max_buy_iterations: 3,
            ..Default::default()
        };
        let result = rebalance(&scenario_book(), &scenario_cov(), params).unwrap();
        assert!(result.stopped_early);
        assert_eq!(result.trades[0].shares, 3.0);
    }

    #[test]
    fn integer_sell_floors_and_skips_zero() {
        // A is a loser overweight by exactly one share.
        let book = PositionBook::new(vec![
            Position::new(t("A"), 31.0, 20.0, 10.0, 0.3),
            Position::new(t("B"), 59.0, 20.0, 10.0, 0.6),
            Position::cash(100.0, 0.1),
        ])
        .unwrap();
        let params = RebalanceParams {
            integer_shares: true,
            min_cash_pct: 0.1,
            ..Default::default()
        };
        let result = rebalance(&book, &scenario_cov(), params).unwrap();
        assert_eq!(result.trades[0].ticker.as_str(), "A");
        assert_eq!(result.trades[0].shares, 1.0);
    }

    #[test]
    fn cash_floor_respected() {
        let book = PositionBook::new(vec![
            Position::new(t("A"), 0.0, 10.0, 10.0, 0.5),
            Position::new(t("B"), 0.0, 10.0, 10.0, 0.5),
            Position::cash(10_000.0, 0.0),
        ])
        .unwrap();
        let params = RebalanceParams {
            min_cash_pct: 0.05,
            ..Default::default()
        };
        let result = rebalance(&book, &CovarianceMatrix::diagonal(&[0.04, 0.02]).unwrap(), params)
            .unwrap();
        assert!((result.cash_end_pct - 0.05).abs() < 1e-12);
        assert_eq!(result.trades.len(), 2);
        assert!((result.total_traded - 9500.0).abs() < 1e-9);
    }

    #[test]
    fn spendable_beyond_underweight_is_fully_spent() {
        // A is $50 under target, B on target; $130 sits above the floor.
        let book = PositionBook::new(vec![
            Position::new(t("A"), 40.0, 10.0, 10.0, 0.45),
            Position::new(t("B"), 45.0, 10.0, 10.0, 0.45),
            Position::cash(150.0, 0.1),
        ])
        .unwrap();
        let result = rebalance(&book, &scenario_cov(), RebalanceParams::default()).unwrap();

        assert_eq!(result.trades.len(), 1);
        let buy = &result.trades[0];
        assert_eq!(buy.ticker.as_str(), "A");
        assert!((buy.proceeds + 130.0).abs() < 1e-9);
        assert!((buy.shares - 13.0).abs() < 1e-9);
        assert!((result.cash_end_pct - 0.02).abs() < 1e-12);
    }

    #[test]
    fn at_basis_is_harvested_with_zero_gain() {
        let book = PositionBook::new(vec![
            Position::new(t("FLAT"), 100.0, 20.0, 20.0, 0.2),
            Position::new(t("UNDER"), 0.0, 20.0, 20.0, 0.7),
            Position::cash(0.0, 0.1),
        ])
        .unwrap();
        let cov = CovarianceMatrix::diagonal(&[0.04, 0.04]).unwrap();
        let params = RebalanceParams {
            tax_weight: 1e6,
            ..Default::default()
        };
        let result = rebalance(&book, &cov, params).unwrap();

        let sell = &result.trades[0];
        assert_eq!(sell.ticker.as_str(), "FLAT");
        assert_eq!(sell.phase, Phase::SellLosses);
        assert!((sell.proceeds - 1600.0).abs() < 1e-9);
        assert_eq!(sell.realized_gain, 0.0);
        assert_eq!(result.estimated_tax_cost, 0.0);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let cov = CovarianceMatrix::diagonal(&[0.02]).unwrap();
        assert!(matches!(
            rebalance(&scenario_book(), &cov, RebalanceParams::default()),
            Err(ValidationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn empty_portfolio_produces_nothing() {
        let book = PositionBook::new(vec![
            Position::new(t("A"), 0.0, 10.0, 10.0, 0.9),
            Position::cash(0.0, 0.1),
        ])
        .unwrap();
        let cov = CovarianceMatrix::diagonal(&[0.04]).unwrap();
        let result = rebalance(&book, &cov, RebalanceParams::default()).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.cash_start_pct, 0.0);
        assert_eq!(result.cash_end_pct, 0.0);
    }
}
