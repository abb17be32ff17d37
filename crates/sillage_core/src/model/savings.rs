//! Usage ledger and the fiscal aggregates derived from it.
//!
//! # Invariants
//! - `UsageRecord` entries are the source of truth; every summary and report
//!   here is recomputable from them at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One registered use of a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub protocol_id: String,
    pub used_at: DateTime<Utc>,
    /// Savings of the protocol at the time of use.
    pub saving: f64,
    /// Real cost of the protocol at the time of use.
    pub cost: f64,
}

/// One ledger line as shown in the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsEntry {
    pub used_at: DateTime<Utc>,
    pub protocol_id: String,
    pub saving: f64,
}

/// Cumulative totals over the usage history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SavingsSummary {
    pub total_saved: f64,
    pub total_spent: f64,
    pub uses: usize,
    pub average_saving_per_use: f64,
    /// `total_saved / total_spent`, 0 when nothing was spent.
    pub roi: f64,
    pub last_updated: Option<DateTime<Utc>>,
    /// Ledger lines in registration order.
    pub history: Vec<SavingsEntry>,
}

/// Savings extrapolated from the historical daily rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SavingsProjection {
    pub daily: f64,
    pub monthly: f64,
    pub annual: f64,
}

/// Value of the references emulated by the active protocol set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NicheEquivalent {
    /// Distinct reference ids, in first-seen order.
    pub reference_ids: Vec<String>,
    pub total_value: f64,
    pub active_protocols: usize,
    pub potential_savings: f64,
}

/// Compact row of the report's top list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopProtocol {
    pub id: String,
    pub name: String,
    pub reference_name: String,
    pub savings: f64,
    pub savings_percent: f64,
    pub times_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub summary: SavingsSummary,
    pub projection: SavingsProjection,
    pub niche_equivalent: NicheEquivalent,
    pub top_protocols: Vec<TopProtocol>,
    pub generated_at: DateTime<Utc>,
}
