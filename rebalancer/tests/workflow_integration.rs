//! Integration tests for the allocate / rebalance / plan workflows.

use std::path::Path;

use allocbook::Phase;
use allocbook_rebalancer::config::Config;
use allocbook_rebalancer::execution::{RunOptions, run_allocate, run_plan, run_rebalance};
use allocbook_rebalancer::input::{AllocationRequest, PlanRequest, RebalanceRequest};

fn config_in(dir: &Path) -> Config {
    let toml = format!(
        r#"
[optimizer]
risk_aversion = 3.0
cash_reserve = 0.02

[rebalance]
tax_weight = 1.0
min_cash_pct = 0.02

[cost]
slippage_bps = 5.0

[logging]
dir = "{}"
audit_file = "audit.jsonl"
"#,
        dir.display()
    );
    Config::from_toml(&toml).unwrap()
}

fn opts(dry_run: bool) -> RunOptions {
    RunOptions {
        dry_run,
        input_file: "test.json".into(),
    }
}

fn audit_events(config: &Config) -> Vec<String> {
    std::fs::read_to_string(config.audit_path())
        .unwrap()
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["event"].as_str().unwrap().to_string()
        })
        .collect()
}

fn holdings_json() -> &'static str {
    r#"{
        "positions": [
            { "ticker": "STOCK1", "quantity": 100, "cost_basis": 50, "price": 55, "target_weight": 0.3 },
            { "ticker": "STOCK2", "quantity": 50,  "cost_basis": 40, "price": 45, "target_weight": 0.6 },
            { "ticker": "CASH",   "quantity": 1000, "cost_basis": 1, "price": 1,  "target_weight": 0.1 }
        ],
        "covariance": [[0.02, 0.01], [0.01, 0.03]]
    }"#
}

fn plan_json() -> String {
    let classes = [
        "large_cap_growth",
        "large_cap_value",
        "small_cap_growth",
        "small_cap_value",
        "developed_market_equity",
        "emerging_market_equity",
        "short_term_treasury",
        "mid_term_treasury",
        "long_term_treasury",
        "corporate_bond",
        "tips",
    ];
    let funds: Vec<String> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                r#"{{ "asset_class": "{c}", "ticker": "F{i:02}", "price": {} }}"#,
                20 + i
            )
        })
        .collect();
    format!(
        r#"{{
            "split": {{ "target_equity": 0.6, "target_bond": 0.4 }},
            "funds": [{}],
            "holdings": {{
                "cash": 50000,
                "positions": [
                    {{ "ticker": "LEGACY", "quantity": 100, "cost_basis": 50, "price": 40 }}
                ]
            }}
        }}"#,
        funds.join(",")
    )
}

#[test]
fn allocate_writes_allocation_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let req = AllocationRequest::from_json(r#"{"target_equity":0.6,"target_bond":0.4}"#).unwrap();

    let allocation = run_allocate(&config, &req, &opts(false)).unwrap();
    assert!((allocation.total() - 1.0).abs() < 1e-12);
    assert_eq!(allocation.cash_weight(), 0.02);

    assert_eq!(
        audit_events(&config),
        vec!["run_started", "allocation_computed", "run_completed"]
    );
}

#[test]
fn rebalance_audits_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let req = RebalanceRequest::from_json(holdings_json()).unwrap();

    let result = run_rebalance(&config, req, &opts(false)).unwrap();
    assert!(result.final_tracking_error <= result.initial_tracking_error);
    assert!(result.cash_end_pct >= 0.02 - 1e-6);

    assert_eq!(
        audit_events(&config),
        vec![
            "run_started",
            "book_assembled",
            "trades_computed",
            "run_completed"
        ]
    );
}

#[test]
fn dry_run_skips_audit_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let req = RebalanceRequest::from_json(holdings_json()).unwrap();

    let result = run_rebalance(&config, req, &opts(true)).unwrap();
    assert!(result.has_trades());
    assert!(!config.audit_path().exists());
}

#[test]
fn plan_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let req = PlanRequest::from_json(&plan_json()).unwrap();

    let result = run_plan(&config, req, &opts(false)).unwrap();

    let legacy = result
        .trades
        .iter()
        .find(|t| t.ticker.as_str() == "LEGACY")
        .unwrap();
    assert_eq!(legacy.phase, Phase::SellLosses);
    assert!(result.final_tracking_error < 1e-9);
    assert!((result.cash_end_pct - 0.02).abs() < 1e-9);

    assert_eq!(
        audit_events(&config),
        vec![
            "run_started",
            "allocation_computed",
            "book_assembled",
            "trades_computed",
            "run_completed"
        ]
    );
}

#[test]
fn plan_with_missing_fund_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let json = r#"{
        "split": { "target_equity": 0.6, "target_bond": 0.4 },
        "funds": [ { "asset_class": "tips", "ticker": "TIP", "price": 110 } ],
        "holdings": { "cash": 1000 }
    }"#;
    let req = PlanRequest::from_json(json).unwrap();

    let err = run_plan(&config, req, &opts(true)).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("unknown asset class"));
}

#[test]
fn mismatched_covariance_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let json = holdings_json().replace("[[0.02, 0.01], [0.01, 0.03]]", "[[0.02]]");
    let req = RebalanceRequest::from_json(&json).unwrap();

    let err = run_rebalance(&config, req, &opts(true)).unwrap_err();
    assert!(err.is_validation());
}
