//! Trade representation

use crate::{Dollars, Shares, Side, Ticker};
use std::fmt;

/// Rebalancing phase that produced a trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Phase {
    /// Overweight positions at or below cost basis, sold unconditionally.
    SellLosses,
    /// Overweight gains sold when the TE improvement outweighs the tax.
    SellGains,
    /// Cash above the floor spent on underweight positions.
    BuyUnderweights,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::SellLosses => write!(f, "SELL_LOSSES"),
            Phase::SellGains => write!(f, "SELL_GAINS_IF_BENEFICIAL"),
            Phase::BuyUnderweights => write!(f, "BUY_UNDERWEIGHTS"),
        }
    }
}

/// One trade in a rebalance plan.
///
/// `proceeds` is the signed cash effect: negative for buys, positive for
/// sells. `realized_gain` is zero for buys.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Trade {
    pub ticker: Ticker,
    pub side: Side,
    pub shares: Shares,
    pub price: f64,
    pub proceeds: Dollars,
    pub realized_gain: Dollars,
    pub phase: Phase,
}

impl Trade {
    /// A sale of `shares` at `price` against a blended `cost_basis`.
    pub fn sell(ticker: Ticker, shares: Shares, price: f64, cost_basis: f64, phase: Phase) -> Self {
        Self {
            ticker,
            side: Side::Sell,
            shares,
            price,
            proceeds: Side::Sell.cash_sign() * shares * price,
            realized_gain: shares * (price - cost_basis),
            phase,
        }
    }

    /// A purchase of `shares` at `price`.
    pub fn buy(ticker: Ticker, shares: Shares, price: f64) -> Self {
        Self {
            ticker,
            side: Side::Buy,
            shares,
            price,
            proceeds: Side::Buy.cash_sign() * shares * price,
            realized_gain: 0.0,
            phase: Phase::BuyUnderweights,
        }
    }

    /// Absolute dollar value traded.
    #[inline]
    pub fn notional(&self) -> Dollars {
        self.proceeds.abs()
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.4} {} @ {:.2} ({:+.2})",
            self.side, self.shares, self.ticker, self.price, self.proceeds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Ticker {
        Ticker::new(s).unwrap()
    }

    #[test]
    fn sell_proceeds_and_gain() {
        let trade = Trade::sell(t("AAA"), 10.0, 55.0, 50.0, Phase::SellGains);
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.proceeds, 550.0);
        assert_eq!(trade.realized_gain, 50.0);
        assert_eq!(trade.notional(), 550.0);
    }

    #[test]
    fn loss_sale_has_negative_gain() {
        let trade = Trade::sell(t("AAA"), 4.0, 8.0, 10.0, Phase::SellLosses);
        assert_eq!(trade.realized_gain, -8.0);
        assert!(trade.proceeds > 0.0);
    }

    #[test]
    fn buy_is_cash_negative() {
        let trade = Trade::buy(t("BBB"), 2.0, 45.0);
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.proceeds, -90.0);
        assert_eq!(trade.realized_gain, 0.0);
        assert_eq!(trade.phase, Phase::BuyUnderweights);
        assert_eq!(trade.notional(), 90.0);
    }

    #[test]
    fn display() {
        let trade = Trade::buy(t("BBB"), 2.0, 45.0);
        assert_eq!(trade.to_string(), "BUY 2.0000 BBB @ 45.00 (-90.00)");
        assert_eq!(Phase::SellGains.to_string(), "SELL_GAINS_IF_BENEFICIAL");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_shape() {
        let trade = Trade::sell(t("AAA"), 1.0, 10.0, 8.0, Phase::SellGains);
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["side"], "SELL");
        assert_eq!(json["phase"], "SELL_GAINS");
        assert_eq!(json["ticker"], "AAA");
        let back: Trade = serde_json::from_value(json).unwrap();
        assert_eq!(back, trade);
    }
}
