//! allocbook-rebalancer: command-line front end for allocbook.
//!
//! Reads a risk split, holdings or a full plan from JSON, runs the
//! composer and the tax-aware rebalancer with parameters from a TOML config,
//! prints the reports, and appends every step to a JSONL audit trail.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod input;
