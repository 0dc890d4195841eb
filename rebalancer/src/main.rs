//! CLI entry point for the allocbook rebalancer.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use allocbook_rebalancer::config::Config;
use allocbook_rebalancer::error::Result;
use allocbook_rebalancer::execution::{self, RunOptions};
use allocbook_rebalancer::input::{AllocationRequest, PlanRequest, RebalanceRequest};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Bucketed mean-variance allocation and tax-aware rebalancing")]
#[command(version)]
struct Cli {
    /// Path to config.toml (built-in defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compose asset-class weights for a risk split
    Allocate {
        /// Path to the request JSON ({target_equity, target_bond, ...})
        request: PathBuf,
    },

    /// Compute tax-aware trades for a position book
    Rebalance {
        /// Path to the holdings JSON ({positions, covariance})
        holdings: PathBuf,

        /// Print the plan without writing the audit trail
        #[arg(long)]
        dry_run: bool,
    },

    /// Risk split to trades: compose, assemble the book, rebalance
    Plan {
        /// Path to the plan JSON ({split, funds, holdings})
        plan: PathBuf,

        /// Print the plan without writing the audit trail
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the standard asset universe
    Universe,
}

fn options(path: &Path, dry_run: bool) -> RunOptions {
    RunOptions {
        dry_run,
        input_file: path.display().to_string(),
    }
}

fn run(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Allocate { request } => {
            let req = AllocationRequest::load(&request)?;
            execution::run_allocate(config, &req, &options(&request, false))?;
        }
        Command::Rebalance { holdings, dry_run } => {
            let req = RebalanceRequest::load(&holdings)?;
            execution::run_rebalance(config, req, &options(&holdings, dry_run))?;
        }
        Command::Plan { plan, dry_run } => {
            let req = PlanRequest::load(&plan)?;
            execution::run_plan(config, req, &options(&plan, dry_run))?;
        }
        Command::Universe => execution::show_universe(),
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(Config::load) {
        Some(Ok(c)) => c,
        Some(Err(e)) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
        None => Config::default(),
    };

    if let Err(e) = run(&config, cli.command) {
        if e.is_validation() {
            eprintln!("Rejected: {e}");
            process::exit(2);
        }
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
