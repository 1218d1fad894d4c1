//! Append-only submission ledger
//!
//! One JSON line per settled plan. The file is the audit trail for every
//! trade the engine attempted, including the losers of the channel race.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::submitter::{SubmissionOutcome, TerminalState};

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub timestamp: DateTime<Utc>,
    pub plan_id: Uuid,
    pub state: String,
    pub signature: Option<String>,
    pub winning_channel: Option<String>,
    pub amount_in: u64,
    pub expected_profit: u64,
    /// Start-token balance delta measured after confirmation. Absent when
    /// the plan never landed.
    pub realized_profit: Option<i64>,
    /// Why the plan was rejected before any channel saw it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    pub venues: Vec<String>,
    pub hop_count: usize,
    pub late_results: Vec<LateResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LateResult {
    pub channel: String,
    pub outcome: String,
}

impl SubmissionRecord {
    pub fn from_outcome(
        outcome: &SubmissionOutcome,
        amount_in: u64,
        expected_profit: u64,
        realized_profit: Option<i64>,
        venues: Vec<String>,
        hop_count: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            plan_id: outcome.plan_id,
            state: outcome.state.label().to_string(),
            signature: outcome.signature.map(|s| s.to_string()),
            winning_channel: outcome.winning_channel.map(|c| c.to_string()),
            amount_in,
            expected_profit,
            realized_profit,
            reject_reason: None,
            venues,
            hop_count,
            late_results: outcome
                .late_results
                .iter()
                .map(|r| LateResult {
                    channel: r.channel.to_string(),
                    outcome: match &r.result {
                        Ok(TerminalState::Confirmed { slot }) => format!("confirmed@{slot}"),
                        Ok(TerminalState::Reverted { reason }) => format!("reverted: {reason}"),
                        Ok(TerminalState::Expired) => "expired".to_string(),
                        Err(reason) => format!("failed: {reason}"),
                    },
                })
                .collect(),
        }
    }

    /// Record for a plan rejected before any channel saw it. These are
    /// terminal too and belong in the audit trail.
    pub fn rejected_locally(
        plan_id: Uuid,
        amount_in: u64,
        expected_profit: u64,
        reason: &str,
        venues: Vec<String>,
        hop_count: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            plan_id,
            state: "rejected_locally".to_string(),
            signature: None,
            winning_channel: None,
            amount_in,
            expected_profit,
            realized_profit: None,
            reject_reason: Some(reason.to_string()),
            venues,
            hop_count,
            late_results: Vec::new(),
        }
    }
}

pub struct ReportLedger {
    path: PathBuf,
}

impl ReportLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, record: &SubmissionRecord) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        info!(
            plan = %record.plan_id,
            state = %record.state,
            expected_profit = record.expected_profit,
            realized_profit = ?record.realized_profit,
            "recorded submission"
        );
        Ok(())
    }

    /// Read the whole ledger back. Malformed lines are skipped, a partial
    /// final line from a crash must not poison the history.
    pub fn load(&self) -> anyhow::Result<Vec<SubmissionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn stats(&self) -> anyhow::Result<LedgerStats> {
        let records = self.load()?;
        let mut stats = LedgerStats::default();
        for record in &records {
            stats.total += 1;
            match record.state.as_str() {
                "confirmed" => {
                    stats.confirmed += 1;
                    if let Some(p) = record.realized_profit {
                        stats.realized_profit_total += p;
                    }
                }
                "reverted" => stats.reverted += 1,
                "expired" => stats.expired += 1,
                "rejected_locally" => stats.rejected_locally += 1,
                _ => stats.other += 1,
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total: u64,
    pub confirmed: u64,
    pub reverted: u64,
    pub expired: u64,
    pub rejected_locally: u64,
    pub other: u64,
    pub realized_profit_total: i64,
}
