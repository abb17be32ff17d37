//! Fiscal audit: what a layering plan costs and what it saves.
//!
//! # Responsibility
//! - Price spray plans against the catalog.
//! - Build the cost-analysis pillar against a reference.
//! - Aggregate the usage ledger into summaries and the financial report.
//!
//! # Invariants
//! - Unknown fragrance ids in a plan are skipped, never an error.
//! - Aggregates are pure functions of their inputs; nothing here persists.

use crate::catalog::Catalog;
use crate::model::protocol::{CostAnalysis, CostLine, LayeringProtocol};
use crate::model::round_to;
use crate::model::savings::{
    FinancialReport, NicheEquivalent, SavingsEntry, SavingsProjection, SavingsSummary,
    TopProtocol, UsageRecord,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of protocols listed in the report's top list.
pub const TOP_PROTOCOLS: usize = 5;
const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_MONTH: f64 = 30.0;
const MONTHS_PER_YEAR: f64 = 12.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FiscalError {
    #[error("reference `{0}` not found")]
    ReferenceNotFound(String),
}

/// Sprays of one fragrance within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprayApplication {
    pub fragrance_id: String,
    pub spray_count: u32,
}

impl SprayApplication {
    pub fn new(fragrance_id: impl Into<String>, spray_count: u32) -> Self {
        Self {
            fragrance_id: fragrance_id.into(),
            spray_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealCost {
    /// Rounded to 3 decimals.
    pub total: f64,
    pub breakdown: Vec<CostLine>,
}

/// Preview of a plan's savings without building the full pillar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuickSavings {
    pub savings: f64,
    pub cost: f64,
    pub savings_percent: f64,
}

/// Itemized cost of a spray plan.
pub fn real_cost(catalog: &Catalog, applications: &[SprayApplication]) -> RealCost {
    let mut total = 0.0;
    let mut breakdown = Vec::with_capacity(applications.len());

    for application in applications {
        let Some(item) = catalog.fragrance(&application.fragrance_id) else {
            continue;
        };
        let subtotal = item.cost_per_application * f64::from(application.spray_count);
        total += subtotal;
        breakdown.push(CostLine {
            fragrance_id: item.id.clone(),
            label: format!("{} - {}", item.house, item.name),
            spray_count: application.spray_count,
            cost_per_application: item.cost_per_application,
            subtotal: round_to(subtotal, 3),
        });
    }

    RealCost {
        total: round_to(total, 3),
        breakdown,
    }
}

/// Cost-analysis pillar of a plan emulating `reference_id`.
///
/// # Errors
/// - `ReferenceNotFound` when the reference is not in the catalog.
pub fn build_cost_analysis(
    catalog: &Catalog,
    reference_id: &str,
    applications: &[SprayApplication],
) -> Result<CostAnalysis, FiscalError> {
    let reference = catalog
        .reference(reference_id)
        .ok_or_else(|| FiscalError::ReferenceNotFound(reference_id.to_string()))?;
    let cost = real_cost(catalog, applications);

    Ok(CostAnalysis::new(
        reference.id.clone(),
        reference.retail_price,
        cost.total,
        cost.breakdown,
    ))
}

pub fn quick_savings(
    catalog: &Catalog,
    reference_price: f64,
    applications: &[SprayApplication],
) -> QuickSavings {
    let cost = real_cost(catalog, applications).total;
    let savings = reference_price - cost;
    let savings_percent = if reference_price > 0.0 {
        savings / reference_price * 100.0
    } else {
        0.0
    };

    QuickSavings {
        savings: round_to(savings, 3),
        cost,
        savings_percent: round_to(savings_percent, 1),
    }
}

/// Totals over the usage ledger. An empty ledger yields zeros.
pub fn summarize_usage_history(history: &[UsageRecord]) -> SavingsSummary {
    if history.is_empty() {
        return SavingsSummary::default();
    }

    let total_saved: f64 = history.iter().map(|entry| entry.saving).sum();
    let total_spent: f64 = history.iter().map(|entry| entry.cost).sum();
    let uses = history.len();
    let roi = if total_spent > 0.0 {
        total_saved / total_spent
    } else {
        0.0
    };

    SavingsSummary {
        total_saved: round_to(total_saved, 3),
        total_spent: round_to(total_spent, 3),
        uses,
        average_saving_per_use: round_to(total_saved / uses as f64, 3),
        roi: round_to(roi, 2),
        last_updated: history.iter().map(|entry| entry.used_at).max(),
        history: history
            .iter()
            .map(|entry| SavingsEntry {
                used_at: entry.used_at,
                protocol_id: entry.protocol_id.clone(),
                saving: entry.saving,
            })
            .collect(),
    }
}

/// Distinct references emulated by the active protocols and their value.
pub fn niche_equivalent(catalog: &Catalog, protocols: &[LayeringProtocol]) -> NicheEquivalent {
    let mut reference_ids: Vec<String> = Vec::new();
    let mut potential_savings = 0.0;
    let mut active_protocols = 0;

    for protocol in protocols.iter().filter(|protocol| protocol.is_active()) {
        active_protocols += 1;
        let analysis = protocol.cost_analysis();
        potential_savings += analysis.savings;
        if !reference_ids.contains(&analysis.reference_id) {
            reference_ids.push(analysis.reference_id.clone());
        }
    }

    let total_value = reference_ids
        .iter()
        .filter_map(|id| catalog.reference(id))
        .map(|reference| reference.retail_price)
        .sum();

    NicheEquivalent {
        reference_ids,
        total_value,
        active_protocols,
        potential_savings: round_to(potential_savings, 2),
    }
}

/// Savings rate extrapolated from the span between first and last use.
pub fn savings_projection(history: &[UsageRecord], total_saved: f64) -> SavingsProjection {
    if history.len() < 2 {
        return SavingsProjection::default();
    }
    let (Some(first), Some(last)) = (
        history.iter().map(|entry| entry.used_at).min(),
        history.iter().map(|entry| entry.used_at).max(),
    ) else {
        return SavingsProjection::default();
    };

    let span_days = (last - first).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY;
    if span_days <= 0.0 {
        return SavingsProjection::default();
    }

    let daily = total_saved / span_days;
    let monthly = daily * DAYS_PER_MONTH;
    SavingsProjection {
        daily: round_to(daily, 2),
        monthly: round_to(monthly, 2),
        annual: round_to(monthly * MONTHS_PER_YEAR, 2),
    }
}

/// Dashboard report: summary, projection, niche value and top protocols.
pub fn financial_report(
    catalog: &Catalog,
    protocols: &[LayeringProtocol],
    history: &[UsageRecord],
    generated_at: DateTime<Utc>,
) -> FinancialReport {
    let summary = summarize_usage_history(history);
    let projection = savings_projection(history, summary.total_saved);
    let niche_equivalent = niche_equivalent(catalog, protocols);

    let mut active = protocols
        .iter()
        .filter(|protocol| protocol.is_active())
        .collect::<Vec<_>>();
    active.sort_by(|a, b| {
        b.cost_analysis()
            .savings
            .total_cmp(&a.cost_analysis().savings)
    });

    let top_protocols = active
        .into_iter()
        .take(TOP_PROTOCOLS)
        .map(|protocol| {
            let analysis = protocol.cost_analysis();
            TopProtocol {
                id: protocol.id().to_string(),
                name: protocol.name().to_string(),
                reference_name: catalog
                    .reference(&analysis.reference_id)
                    .map_or_else(|| "Unknown".to_string(), |r| r.name.clone()),
                savings: analysis.savings,
                savings_percent: analysis.savings_percent,
                times_used: protocol.times_used(),
            }
        })
        .collect();

    FinancialReport {
        summary,
        projection,
        niche_equivalent,
        top_protocols,
        generated_at,
    }
}
