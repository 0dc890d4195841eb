//! Rebalance output: trades plus before/after summary.

use std::fmt;

use crate::book::PositionBook;
use crate::cost_model::CostModel;
use crate::side::Side;
use crate::trade::Trade;
use crate::types::{Dollars, Shares, Ticker, Weight};

/// Post-rebalance state of one ticker.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationRow {
    pub ticker: Ticker,
    pub quantity: Shares,
    pub price: f64,
    pub value: Dollars,
    pub weight: Weight,
    pub target_weight: Weight,
}

impl AllocationRow {
    /// One row per security in book order, then the CASH row.
    pub(crate) fn table(book: &PositionBook, quantities: &[Shares], cash: Dollars) -> Vec<Self> {
        let (weights, cash_weight) = book.weights(quantities, cash);
        let mut rows: Vec<Self> = book
            .securities()
            .iter()
            .zip(quantities)
            .zip(weights)
            .map(|((pos, &quantity), weight)| Self {
                ticker: pos.ticker.clone(),
                quantity,
                price: pos.price,
                value: quantity * pos.price,
                weight,
                target_weight: pos.target_weight,
            })
            .collect();
        rows.push(Self {
            ticker: Ticker::cash(),
            quantity: cash,
            price: 1.0,
            value: cash,
            weight: cash_weight,
            target_weight: book.cash_target(),
        });
        rows
    }

    /// `weight - target_weight`.
    #[inline]
    pub fn drift(&self) -> Weight {
        self.weight - self.target_weight
    }
}

/// Everything the rebalancer produced.
///
/// Percentages are fractions of total portfolio value (0.02 = 2%).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceResult {
    pub initial_tracking_error: f64,
    pub final_tracking_error: f64,
    /// Sum of realized gains over all sells. Negative when losses dominate.
    pub realized_net_gains: Dollars,
    /// `ltcg_rate * realized_net_gains`; negative means a tax benefit.
    pub estimated_tax_cost: Dollars,
    pub cash_start_pct: f64,
    pub cash_end_pct: f64,
    /// Sum of absolute proceeds.
    pub total_traded: Dollars,
    /// Sells first (losses, then gains), then buys.
    pub trades: Vec<Trade>,
    pub allocation: Vec<AllocationRow>,
    /// The integer buy loop hit its iteration cap with purchases remaining.
    pub stopped_early: bool,
}

impl RebalanceResult {
    /// Returns true if any trades were generated.
    pub fn has_trades(&self) -> bool {
        !self.trades.is_empty()
    }

    pub fn sells(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.side == Side::Sell)
    }

    pub fn buys(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.side == Side::Buy)
    }

    /// Estimated commission and slippage over the whole trade list.
    pub fn estimated_friction(&self, model: &CostModel) -> Dollars {
        self.trades.iter().map(|t| model.compute_cost(t.notional())).sum()
    }
}

impl fmt::Display for RebalanceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Rebalance Summary")?;
        writeln!(f, "─────────────────────────────────────────")?;
        writeln!(
            f,
            "  Tracking error:   {:.4}% -> {:.4}%",
            self.initial_tracking_error * 100.0,
            self.final_tracking_error * 100.0
        )?;
        writeln!(
            f,
            "  Cash:             {:.2}% -> {:.2}%",
            self.cash_start_pct * 100.0,
            self.cash_end_pct * 100.0
        )?;
        writeln!(f, "  Realized gains:   ${:.2}", self.realized_net_gains)?;
        writeln!(f, "  Est. tax cost:    ${:.2}", self.estimated_tax_cost)?;
        writeln!(f, "  Total traded:     ${:.2}", self.total_traded)?;
        if self.stopped_early {
            writeln!(f, "  (buy loop stopped at its iteration cap)")?;
        }

        writeln!(f)?;
        if self.trades.is_empty() {
            writeln!(f, "  No trades.")?;
        } else {
            writeln!(
                f,
                "  {:<5} {:<8} {:>12} {:>10} {:>12} {:>10}",
                "SIDE", "TICKER", "SHARES", "PRICE", "PROCEEDS", "GAIN"
            )?;
            for t in &self.trades {
                writeln!(
                    f,
                    "  {:<5} {:<8} {:>12.4} {:>10.2} {:>12.2} {:>10.2}",
                    t.side.to_string(),
                    t.ticker.as_str(),
                    t.shares,
                    t.price,
                    t.proceeds,
                    t.realized_gain
                )?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "  {:<8} {:>12} {:>10} {:>12} {:>8} {:>8}",
            "TICKER", "QTY", "PRICE", "VALUE", "WEIGHT", "TARGET"
        )?;
        for row in &self.allocation {
            writeln!(
                f,
                "  {:<8} {:>12.4} {:>10.2} {:>12.2} {:>7.2}% {:>7.2}%",
                row.ticker.as_str(),
                row.quantity,
                row.price,
                row.value,
                row.weight * 100.0,
                row.target_weight * 100.0
            )?;
        }
        Ok(())
    }
}
