//! Protocol query engine: filtering, sorting and pagination.
//!
//! # Invariants
//! - Filters combine with AND; an unset filter matches everything.
//! - `active_only` defaults to true.
//! - Sorting is stable, so equal keys keep storage order.

use crate::model::fragrance::Family;
use crate::model::protocol::{LayeringProtocol, Tier};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Savings, highest first.
    Savings,
    /// Compatibility score, highest first.
    Compatibility,
    /// Real cost, cheapest first.
    Cost,
    /// Name, A to Z (case-insensitive).
    Name,
    /// Times used, most used first.
    TimesUsed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolFilter {
    pub family: Option<Family>,
    pub tier: Option<Tier>,
    pub min_savings: Option<f64>,
    pub max_cost: Option<f64>,
    /// Only protocols using this fragrance.
    pub fragrance_id: Option<String>,
    /// Case-insensitive match on name, description or category.
    pub text: Option<String>,
    pub favorites_only: bool,
    pub active_only: bool,
    pub sort: Option<SortKey>,
}

impl Default for ProtocolFilter {
    fn default() -> Self {
        Self {
            family: None,
            tier: None,
            min_savings: None,
            max_cost: None,
            fragrance_id: None,
            text: None,
            favorites_only: false,
            active_only: true,
            sort: None,
        }
    }
}

impl ProtocolFilter {
    pub fn matches(&self, protocol: &LayeringProtocol) -> bool {
        let analysis = protocol.cost_analysis();
        let chemistry = protocol.compatibility();

        if let Some(family) = self.family {
            if !chemistry.families.contains(&family) {
                return false;
            }
        }
        if self.tier.is_some_and(|tier| chemistry.tier != tier) {
            return false;
        }
        if self.min_savings.is_some_and(|min| analysis.savings < min) {
            return false;
        }
        if self.max_cost.is_some_and(|max| analysis.real_cost > max) {
            return false;
        }
        if let Some(id) = &self.fragrance_id {
            if !protocol.uses_item(id) {
                return false;
            }
        }
        if let Some(text) = self.text.as_deref().filter(|text| !text.is_empty()) {
            let needle = text.to_lowercase();
            let hit = [protocol.name(), protocol.description(), protocol.category()]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if self.favorites_only && !protocol.is_favorite() {
            return false;
        }
        if self.active_only && !protocol.is_active() {
            return false;
        }
        true
    }
}

fn compare(key: SortKey, a: &LayeringProtocol, b: &LayeringProtocol) -> Ordering {
    match key {
        SortKey::Savings => b
            .cost_analysis()
            .savings
            .total_cmp(&a.cost_analysis().savings),
        SortKey::Compatibility => b
            .compatibility()
            .score
            .total_cmp(&a.compatibility().score),
        SortKey::Cost => a
            .cost_analysis()
            .real_cost
            .total_cmp(&b.cost_analysis().real_cost),
        SortKey::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
        SortKey::TimesUsed => b.times_used().cmp(&a.times_used()),
    }
}

/// Filters and optionally sorts `protocols`.
pub fn search<'a>(
    protocols: &'a [LayeringProtocol],
    filter: &ProtocolFilter,
) -> Vec<&'a LayeringProtocol> {
    let mut results = protocols
        .iter()
        .filter(|protocol| filter.matches(protocol))
        .collect::<Vec<_>>();
    if let Some(key) = filter.sort {
        results.sort_by(|a, b| compare(key, a, b));
    }
    results
}

/// One page of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    /// 1-based page number that was requested.
    pub page: usize,
    pub total_pages: usize,
}

/// Slices `items` into 1-based pages. Pages past the end are empty.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size);
    let start = (page - 1).saturating_mul(page_size);

    let data = items.into_iter().skip(start).take(page_size).collect();
    Page {
        data,
        total,
        page,
        total_pages,
    }
}
