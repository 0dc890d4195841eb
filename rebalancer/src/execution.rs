//! Run orchestration: load → compose / assemble → rebalance → report → audit.
//!
//! Each command writes its report to stdout and, unless it is a dry run,
//! appends its steps to the audit trail.

use std::fmt;

use allocbook::{
    AssetUniverse, CompositionParams, PositionBook, RebalanceResult, TargetAllocation,
    TaxAwareRebalancer,
};
use log::{info, warn};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::Result;
use crate::input::{AllocationRequest, PlanRequest, RebalanceRequest};

/// Options for a single run.
pub struct RunOptions {
    pub dry_run: bool,
    pub input_file: String,
}

fn open_audit(config: &Config, opts: &RunOptions, command: &str) -> Result<Option<AuditLog>> {
    if opts.dry_run {
        return Ok(None);
    }
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, command, &opts.input_file)?;
    Ok(Some(audit))
}

/// Configured optimizer parameters with the request's overrides applied.
pub fn composition_params(config: &Config, request: &AllocationRequest) -> CompositionParams {
    let mut params = config.composition(request.target_equity, request.target_bond);
    if let Some(lambda) = request.risk_aversion {
        params.risk_aversion = lambda;
    }
    if let Some(cash) = request.cash_reserve {
        params.cash_reserve = cash;
    }
    params
}

/// Compose `universe` for the requested risk split.
pub fn compute_allocation(
    config: &Config,
    universe: &AssetUniverse,
    request: &AllocationRequest,
) -> Result<TargetAllocation> {
    let params = composition_params(config, request);
    let allocation = universe.compose(&params, &config.cash_bounds())?;
    info!(
        "composed {} classes (equity {:.2}, bond {:.2}, lambda {}, cash {:.4})",
        allocation.len(),
        params.target_equity,
        params.target_bond,
        params.risk_aversion,
        allocation.cash_weight()
    );
    Ok(allocation)
}

/// `allocate`: print asset-class weights for a risk split.
pub fn run_allocate(
    config: &Config,
    request: &AllocationRequest,
    opts: &RunOptions,
) -> Result<TargetAllocation> {
    let mut audit = open_audit(config, opts, "allocate")?;
    let universe = AssetUniverse::standard();
    let allocation = compute_allocation(config, &universe, request)?;

    print!(
        "{}",
        AllocationReport {
            universe: &universe,
            allocation: &allocation,
        }
    );

    if let Some(audit) = audit.as_mut() {
        audit::log_allocation(audit, &allocation)?;
        audit.log_simple("run_completed")?;
    }
    Ok(allocation)
}

/// `rebalance`: trades for an existing book and ticker covariance.
pub fn run_rebalance(
    config: &Config,
    request: RebalanceRequest,
    opts: &RunOptions,
) -> Result<RebalanceResult> {
    let mut audit = open_audit(config, opts, "rebalance")?;
    let (book, covariance) = request.into_parts()?;
    if let Some(audit) = audit.as_mut() {
        audit::log_book(audit, &book)?;
    }

    let rebalancer = TaxAwareRebalancer::new(config.rebalance_params())?;
    let result = rebalancer.rebalance(&book, &covariance)?;
    finish(config, &result, audit.as_mut(), opts)?;
    Ok(result)
}

/// `plan`: risk split → allocation → book → trades.
pub fn run_plan(config: &Config, request: PlanRequest, opts: &RunOptions) -> Result<RebalanceResult> {
    let mut audit = open_audit(config, opts, "plan")?;
    let universe = AssetUniverse::standard();

    let allocation = compute_allocation(config, &universe, &request.split)?;
    print!(
        "{}",
        AllocationReport {
            universe: &universe,
            allocation: &allocation,
        }
    );
    println!();
    if let Some(audit) = audit.as_mut() {
        audit::log_allocation(audit, &allocation)?;
    }

    let book = PositionBook::assemble(&allocation, &request.funds, &request.holdings)?;
    let covariance = request.funds.covariance_for(&book, &universe)?;
    info!(
        "assembled book: {} securities, ${:.2} cash",
        book.len(),
        book.cash()
    );
    if let Some(audit) = audit.as_mut() {
        audit::log_book(audit, &book)?;
    }

    let rebalancer = TaxAwareRebalancer::new(config.rebalance_params())?;
    let result = rebalancer.rebalance(&book, &covariance)?;
    finish(config, &result, audit.as_mut(), opts)?;
    Ok(result)
}

fn finish(
    config: &Config,
    result: &RebalanceResult,
    audit: Option<&mut AuditLog>,
    opts: &RunOptions,
) -> Result<()> {
    let cost = config.cost_model();
    print!("{result}");
    println!(
        "\nEstimated friction: ${:.2} ({} trades)",
        result.estimated_friction(&cost),
        result.trades.len()
    );
    if result.stopped_early {
        warn!("integer buy loop stopped at its iteration cap; raise max_buy_iterations");
    }

    match audit {
        Some(audit) => {
            audit::log_trades(audit, result)?;
            audit::log_run_completed(audit, result, &cost)?;
        }
        None if opts.dry_run => println!("\n[DRY RUN] Audit trail not written."),
        None => {}
    }
    Ok(())
}

/// `universe`: print the standard asset classes.
pub fn show_universe() {
    print!("{}", UniverseReport(&AssetUniverse::standard()));
}

/// Table of allocated weights with bucket and volatility per class.
pub struct AllocationReport<'a> {
    pub universe: &'a AssetUniverse,
    pub allocation: &'a TargetAllocation,
}

impl fmt::Display for AllocationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Target Allocation")?;
        writeln!(f, "─────────────────────────────────────────────────────")?;
        writeln!(
            f,
            "  {:<26} {:<7} {:>9} {:>9}",
            "CLASS", "BUCKET", "WEIGHT", "VOL"
        )?;
        for (id, weight) in self.allocation.iter() {
            let (bucket, vol) = match self.universe.class(id) {
                Some(class) => (
                    class.bucket.to_string(),
                    format!("{:.2}%", self.universe.volatility(class) * 100.0),
                ),
                None => ("-".to_string(), "-".to_string()),
            };
            writeln!(
                f,
                "  {:<26} {:<7} {:>8.2}% {:>9}",
                id,
                bucket,
                weight * 100.0,
                vol
            )?;
        }
        writeln!(
            f,
            "  {:<26} {:<7} {:>8.2}%",
            "TOTAL",
            "",
            self.allocation.total() * 100.0
        )
    }
}

/// Table of asset classes with expected return and volatility.
pub struct UniverseReport<'a>(pub &'a AssetUniverse);

impl fmt::Display for UniverseReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let universe = self.0;
        writeln!(f, "Asset Universe ({} classes)", universe.classes().len())?;
        writeln!(f, "─────────────────────────────────────────────────────")?;
        writeln!(
            f,
            "  {:<26} {:<7} {:>9} {:>9}",
            "CLASS", "BUCKET", "RETURN", "VOL"
        )?;
        for class in universe.classes() {
            writeln!(
                f,
                "  {:<26} {:<7} {:>8.2}% {:>8.2}%",
                class.id,
                class.bucket.to_string(),
                class.expected_return * 100.0,
                universe.volatility(class) * 100.0
            )?;
        }
        Ok(())
    }
}
