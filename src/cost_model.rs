//! Transaction cost modeling.

/// Estimates trading friction for a rebalance plan.
///
/// Costs are a percentage of notional value (in basis points) with a
/// minimum per-trade fee. Only trades with non-zero notional pay the minimum.
///
/// ```
/// use allocbook::CostModel;
///
/// let model = CostModel { commission_bps: 10.0, slippage_bps: 5.0, min_trade_fee: 1.0 };
/// // 15 bps on $10,000 = $15.00, above the $1.00 minimum
/// assert!((model.compute_cost(10_000.0) - 15.0).abs() < 1e-9);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CostModel {
    /// Commission in basis points (1 bps = 0.01%)
    pub commission_bps: f64,
    /// Slippage / spread estimate in basis points
    pub slippage_bps: f64,
    /// Minimum fee per trade (dollars)
    pub min_trade_fee: f64,
}

impl CostModel {
    /// A zero-cost model (no fees, no slippage).
    pub fn zero() -> Self {
        Self {
            commission_bps: 0.0,
            slippage_bps: 0.0,
            min_trade_fee: 0.0,
        }
    }

    /// Cost in dollars for a trade of the given notional. Sign is ignored.
    pub fn compute_cost(&self, notional: f64) -> f64 {
        let notional = notional.abs();
        if notional == 0.0 {
            return 0.0;
        }
        let bps = self.commission_bps + self.slippage_bps;
        (notional * bps / 10_000.0).max(self.min_trade_fee)
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::zero()
    }
}
