//! JSONL audit trail logging.
//!
//! Each run appends events to an audit.jsonl file, one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use allocbook::{CostModel, PositionBook, RebalanceResult, TargetAllocation};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

pub fn log_run_started(audit: &mut AuditLog, command: &str, input_file: &str) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "command": command,
            "input_file": input_file,
        }),
    )
}

pub fn log_allocation(audit: &mut AuditLog, allocation: &TargetAllocation) -> Result<()> {
    let weights: serde_json::Map<String, serde_json::Value> = allocation
        .iter()
        .map(|(class, w)| (class.to_string(), serde_json::json!(w)))
        .collect();

    audit.log(
        "allocation_computed",
        serde_json::json!({
            "weights": weights,
            "cash_weight": allocation.cash_weight(),
        }),
    )
}

pub fn log_book(audit: &mut AuditLog, book: &PositionBook) -> Result<()> {
    let positions: Vec<_> = book
        .securities()
        .iter()
        .map(|p| {
            serde_json::json!({
                "ticker": p.ticker.as_str(),
                "qty": p.quantity,
                "basis": p.cost_basis,
                "price": p.price,
                "target": p.target_weight,
            })
        })
        .collect();

    let total = book.total_value(&book.quantities(), book.cash());
    audit.log(
        "book_assembled",
        serde_json::json!({
            "positions": positions,
            "cash": book.cash(),
            "cash_target": book.cash_target(),
            "total_value": total,
        }),
    )
}

pub fn log_trades(audit: &mut AuditLog, result: &RebalanceResult) -> Result<()> {
    let trades: Vec<_> = result
        .trades
        .iter()
        .map(|t| {
            serde_json::json!({
                "ticker": t.ticker.as_str(),
                "side": t.side.to_string(),
                "shares": t.shares,
                "price": t.price,
                "proceeds": t.proceeds,
                "gain": t.realized_gain,
                "phase": t.phase.to_string(),
            })
        })
        .collect();

    audit.log(
        "trades_computed",
        serde_json::json!({
            "trades": trades,
            "te_before": result.initial_tracking_error,
            "te_after": result.final_tracking_error,
            "stopped_early": result.stopped_early,
        }),
    )
}

pub fn log_run_completed(
    audit: &mut AuditLog,
    result: &RebalanceResult,
    cost: &CostModel,
) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "trades": result.trades.len(),
            "realized_gains": result.realized_net_gains,
            "tax_cost": result.estimated_tax_cost,
            "total_traded": result.total_traded,
            "friction": result.estimated_friction(cost),
            "cash_end_pct": result.cash_end_pct,
        }),
    )
}
