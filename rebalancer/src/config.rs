//! TOML configuration loading and validation.

use std::path::Path;

use allocbook::{CashReserveBounds, CompositionParams, CostModel, RebalanceParams};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration. Every section may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
    #[serde(default = "default_cash_reserve")]
    pub cash_reserve: f64,
    #[serde(default = "default_cash_reserve_min")]
    pub cash_reserve_min: f64,
    #[serde(default = "default_cash_reserve_max")]
    pub cash_reserve_max: f64,
}

fn default_risk_aversion() -> f64 {
    1.0
}
fn default_cash_reserve() -> f64 {
    0.05
}
fn default_cash_reserve_min() -> f64 {
    0.02
}
fn default_cash_reserve_max() -> f64 {
    0.05
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_aversion: default_risk_aversion(),
            cash_reserve: default_cash_reserve(),
            cash_reserve_min: default_cash_reserve_min(),
            cash_reserve_max: default_cash_reserve_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    #[serde(default = "default_tax_weight")]
    pub tax_weight: f64,
    #[serde(default = "default_ltcg_rate")]
    pub ltcg_rate: f64,
    #[serde(default)]
    pub integer_shares: bool,
    #[serde(default = "default_min_cash_pct")]
    pub min_cash_pct: f64,
    #[serde(default = "default_max_buy_iterations")]
    pub max_buy_iterations: usize,
}

fn default_tax_weight() -> f64 {
    1.0
}
fn default_ltcg_rate() -> f64 {
    0.15
}
fn default_min_cash_pct() -> f64 {
    0.02
}
fn default_max_buy_iterations() -> usize {
    allocbook::rebalance::DEFAULT_MAX_BUY_ITERATIONS
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            tax_weight: default_tax_weight(),
            ltcg_rate: default_ltcg_rate(),
            integer_shares: false,
            min_cash_pct: default_min_cash_pct(),
            max_buy_iterations: default_max_buy_iterations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    #[serde(default)]
    pub commission_bps: f64,
    #[serde(default = "default_slippage")]
    pub slippage_bps: f64,
    #[serde(default)]
    pub min_trade_fee: f64,
}

fn default_slippage() -> f64 {
    5.0
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            commission_bps: 0.0,
            slippage_bps: default_slippage(),
            min_trade_fee: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants by converting every section.
    fn validate(&self) -> Result<()> {
        let bounds = self.cash_bounds();
        bounds
            .validate()
            .map_err(|e| Error::Config(format!("[optimizer] {e}")))?;
        self.composition(0.6, 0.4)
            .validate(&bounds)
            .map_err(|e| Error::Config(format!("[optimizer] {e}")))?;
        self.rebalance_params()
            .validate()
            .map_err(|e| Error::Config(format!("[rebalance] {e}")))?;

        let cost = &self.cost;
        if cost.commission_bps < 0.0 || cost.slippage_bps < 0.0 || cost.min_trade_fee < 0.0 {
            return Err(Error::Config("[cost] values must be >= 0".into()));
        }
        Ok(())
    }

    pub fn cash_bounds(&self) -> CashReserveBounds {
        CashReserveBounds {
            min: self.optimizer.cash_reserve_min,
            max: self.optimizer.cash_reserve_max,
        }
    }

    /// Composition parameters for a given risk split.
    pub fn composition(&self, target_equity: f64, target_bond: f64) -> CompositionParams {
        CompositionParams {
            target_equity,
            target_bond,
            risk_aversion: self.optimizer.risk_aversion,
            cash_reserve: self.optimizer.cash_reserve,
        }
    }

    pub fn rebalance_params(&self) -> RebalanceParams {
        let r = &self.rebalance;
        RebalanceParams {
            tax_weight: r.tax_weight,
            ltcg_rate: r.ltcg_rate,
            integer_shares: r.integer_shares,
            min_cash_pct: r.min_cash_pct,
            max_buy_iterations: r.max_buy_iterations,
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel {
            commission_bps: self.cost.commission_bps,
            slippage_bps: self.cost.slippage_bps,
            min_trade_fee: self.cost.min_trade_fee,
        }
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[optimizer]
risk_aversion = 3.0
cash_reserve = 0.03
cash_reserve_min = 0.02
cash_reserve_max = 0.05

[rebalance]
tax_weight = 0.5
ltcg_rate = 0.20
integer_shares = true
min_cash_pct = 0.01
max_buy_iterations = 1000

[cost]
commission_bps = 1.0
slippage_bps = 5.0
min_trade_fee = 0.35

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.optimizer.risk_aversion, 3.0);
        assert_eq!(config.optimizer.cash_reserve, 0.03);
        assert_eq!(config.rebalance.tax_weight, 0.5);
        assert!(config.rebalance.integer_shares);
        assert_eq!(config.rebalance.max_buy_iterations, 1000);
        assert_eq!(config.cost.min_trade_fee, 0.35);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.rebalance_params(), RebalanceParams::default());
        assert_eq!(config.cash_bounds(), CashReserveBounds::default());
        assert_eq!(config.cost.slippage_bps, 5.0);
        assert_eq!(
            config.composition(0.6, 0.4),
            CompositionParams::default()
        );
    }

    #[test]
    fn partial_section_fills_defaults() {
        let config = Config::from_toml("[rebalance]\ntax_weight = 2.0\n").unwrap();
        assert_eq!(config.rebalance.tax_weight, 2.0);
        assert_eq!(config.rebalance.ltcg_rate, 0.15);
        assert_eq!(config.rebalance.min_cash_pct, 0.02);
    }

    #[test]
    fn validate_catches_reserve_outside_bounds() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.optimizer.cash_reserve = 0.10;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_catches_inverted_bounds() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.optimizer.cash_reserve_min = 0.06;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_risk_aversion() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.optimizer.risk_aversion = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_ltcg_rate() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.rebalance.ltcg_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_negative_cost() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.cost.slippage_bps = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_key_type_is_parse_error() {
        let err = Config::from_toml("[rebalance]\ntax_weight = \"high\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn converts_to_engine_params() {
        let config = Config::from_toml(example_toml()).unwrap();
        let params = config.rebalance_params();
        assert_eq!(params.ltcg_rate, 0.20);
        assert_eq!(params.min_cash_pct, 0.01);
        let cost = config.cost_model();
        assert_eq!(cost.commission_bps, 1.0);
        let comp = config.composition(0.7, 0.3);
        assert_eq!(comp.target_equity, 0.7);
        assert_eq!(comp.risk_aversion, 3.0);
    }

    #[test]
    fn audit_path() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(
            config.audit_path(),
            std::path::PathBuf::from("./logs/audit.jsonl")
        );
    }
}
