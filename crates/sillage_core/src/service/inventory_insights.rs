//! Analytics over the owned collection.
//!
//! # Responsibility
//! - Group, rank and summarize owned items for dashboards.
//! - Suggest catalog items that would widen the collection.
//!
//! # Invariants
//! - Pure functions over catalog data; nothing here persists.
//! - Equal keys keep input order.

use super::layering_service::OwnedItem;
use crate::catalog::Catalog;
use crate::engine::compatibility::total_compatibility;
use crate::model::fragrance::{Concentration, Family, FragranceItem};
use crate::model::round_to;
use serde::{Deserialize, Serialize};

const FAMILY_ABSENT_SCORE: u32 = 50;
const FAMILY_THIN_SCORE: u32 = 30;
const FAMILY_COVERED_SCORE: u32 = 10;
/// Owned items of a family at or below which the family counts as thin.
const FAMILY_THIN_LIMIT: usize = 2;
const CONCENTRATED_SCORE: u32 = 15;
const CHEAP_APPLICATION: f64 = 0.10;
const CHEAP_APPLICATION_SCORE: u32 = 20;
const MODEST_APPLICATION: f64 = 0.15;
const MODEST_APPLICATION_SCORE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyGroup {
    pub family: Family,
    pub items: Vec<OwnedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseGroup {
    pub house: String,
    pub items: Vec<OwnedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyCount {
    pub family: Family,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseCount {
    pub house: String,
    pub count: usize,
}

/// Dashboard view of the owned collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_items: usize,
    pub catalog_size: usize,
    /// Whole percent of the catalog owned.
    pub catalog_coverage_percent: u32,
    pub retail_value: f64,
    /// Summed savings of the active protocols each item takes part in.
    pub fiscal_value: f64,
    pub dominant_family: Option<FamilyCount>,
    pub dominant_house: Option<HouseCount>,
    /// Counts in first-seen order.
    pub families: Vec<FamilyCount>,
    pub houses: Vec<HouseCount>,
    pub average_cost_per_application: f64,
}

/// A catalog item worth buying next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseSuggestion {
    pub item: FragranceItem,
    pub score: u32,
    pub reason: String,
    /// Owned items this one would pair with above the compatibility threshold.
    pub unlocked_pairs: usize,
}

/// Owned items grouped by family, in [`Family::ALL`] order. Empty families are omitted.
pub fn group_by_family(owned: &[OwnedItem]) -> Vec<FamilyGroup> {
    Family::ALL
        .iter()
        .map(|family| FamilyGroup {
            family: *family,
            items: owned
                .iter()
                .filter(|entry| entry.item.family == *family)
                .cloned()
                .collect(),
        })
        .filter(|group| !group.items.is_empty())
        .collect()
}

/// Owned items grouped by house, houses in first-seen order.
pub fn group_by_house(owned: &[OwnedItem]) -> Vec<HouseGroup> {
    let mut groups: Vec<HouseGroup> = Vec::new();
    for entry in owned {
        match groups
            .iter_mut()
            .find(|group| group.house == entry.item.house)
        {
            Some(group) => group.items.push(entry.clone()),
            None => groups.push(HouseGroup {
                house: entry.item.house.clone(),
                items: vec![entry.clone()],
            }),
        }
    }
    groups
}

/// Owned items ranked by the savings of the protocols they enable.
pub fn top_value(owned: &[OwnedItem], limit: usize) -> Vec<OwnedItem> {
    let mut ranked = owned.to_vec();
    ranked.sort_by(|a, b| b.potential_savings.total_cmp(&a.potential_savings));
    ranked.truncate(limit);
    ranked
}

/// Owned items no active protocol uses.
pub fn unused(owned: &[OwnedItem]) -> Vec<OwnedItem> {
    owned
        .iter()
        .filter(|entry| entry.active_protocols == 0)
        .cloned()
        .collect()
}

fn tally<K: PartialEq>(keys: impl Iterator<Item = K>) -> Vec<(K, usize)> {
    let mut counts: Vec<(K, usize)> = Vec::new();
    for key in keys {
        match counts.iter_mut().find(|(seen, _)| *seen == key) {
            Some((_, count)) => *count += 1,
            None => counts.push((key, 1)),
        }
    }
    counts
}

/// Highest count; the first-seen key wins a tie.
fn dominant<K: Clone>(counts: &[(K, usize)]) -> Option<(K, usize)> {
    let mut best: Option<&(K, usize)> = None;
    for entry in counts {
        if best.map_or(true, |current| entry.1 > current.1) {
            best = Some(entry);
        }
    }
    best.cloned()
}

pub fn summarize_inventory(owned: &[OwnedItem], catalog_size: usize) -> InventorySummary {
    let families = tally(owned.iter().map(|entry| entry.item.family));
    let houses = tally(owned.iter().map(|entry| entry.item.house.clone()));
    let total_items = owned.len();

    let catalog_coverage_percent = if catalog_size > 0 {
        (total_items as f64 / catalog_size as f64 * 100.0).round() as u32
    } else {
        0
    };
    let average_cost_per_application = if total_items > 0 {
        let total: f64 = owned
            .iter()
            .map(|entry| entry.item.cost_per_application)
            .sum();
        round_to(total / total_items as f64, 3)
    } else {
        0.0
    };

    InventorySummary {
        total_items,
        catalog_size,
        catalog_coverage_percent,
        retail_value: owned.iter().map(|entry| entry.item.retail_price).sum(),
        fiscal_value: round_to(owned.iter().map(|entry| entry.potential_savings).sum(), 2),
        dominant_family: dominant(&families).map(|(family, count)| FamilyCount { family, count }),
        dominant_house: dominant(&houses).map(|(house, count)| HouseCount { house, count }),
        families: families
            .into_iter()
            .map(|(family, count)| FamilyCount { family, count })
            .collect(),
        houses: houses
            .into_iter()
            .map(|(house, count)| HouseCount { house, count })
            .collect(),
        average_cost_per_application,
    }
}

fn family_score(family: Family, owned_of_family: usize) -> (u32, String) {
    match owned_of_family {
        0 => (
            FAMILY_ABSENT_SCORE,
            format!("{family} is not represented in your inventory"),
        ),
        count if count <= FAMILY_THIN_LIMIT => (
            FAMILY_THIN_SCORE,
            format!("Would strengthen {family} (only {count} owned)"),
        ),
        _ => (
            FAMILY_COVERED_SCORE,
            format!("Would widen your {family} options"),
        ),
    }
}

/// Scores every catalog item not owned and returns the best `limit`.
///
/// The score rewards under-represented families, concentrated juices and a
/// cheap application. Ties go to the item unlocking more pairs, then to
/// catalog order.
pub fn suggest_purchases<S: AsRef<str>>(
    catalog: &Catalog,
    inventory: &[S],
    min_compatibility: f64,
    limit: usize,
) -> Vec<PurchaseSuggestion> {
    let owned = inventory
        .iter()
        .filter_map(|id| catalog.fragrance(id.as_ref()))
        .collect::<Vec<_>>();

    let mut suggestions = catalog
        .fragrances()
        .iter()
        .filter(|candidate| !owned.iter().any(|item| item.id == candidate.id))
        .map(|candidate| {
            let of_family = owned
                .iter()
                .filter(|item| item.family == candidate.family)
                .count();
            let (mut score, reason) = family_score(candidate.family, of_family);
            if matches!(
                candidate.concentration,
                Concentration::Edp | Concentration::Parfum
            ) {
                score += CONCENTRATED_SCORE;
            }
            if candidate.cost_per_application < CHEAP_APPLICATION {
                score += CHEAP_APPLICATION_SCORE;
            } else if candidate.cost_per_application < MODEST_APPLICATION {
                score += MODEST_APPLICATION_SCORE;
            }

            let unlocked_pairs = owned
                .iter()
                .filter(|item| {
                    total_compatibility(&[candidate, **item]).score >= min_compatibility
                })
                .count();

            PurchaseSuggestion {
                item: candidate.clone(),
                score,
                reason,
                unlocked_pairs,
            }
        })
        .collect::<Vec<_>>();

    suggestions.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.unlocked_pairs.cmp(&a.unlocked_pairs))
    });
    suggestions.truncate(limit);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fragrance::FragranceRecord;

    fn item(id: &str, house: &str, family: Family, price: f64) -> FragranceItem {
        FragranceItem::new(FragranceRecord {
            id: id.to_string(),
            name: id.to_string(),
            house: house.to_string(),
            family,
            subfamily: None,
            concentration: Concentration::Edt,
            volume_ml: 100.0,
            retail_price: price,
            top_notes: vec!["cedar".to_string()],
            heart_notes: Vec::new(),
            base_notes: Vec::new(),
            active: true,
        })
        .unwrap()
    }

    fn owned(item: FragranceItem, active_protocols: usize, potential_savings: f64) -> OwnedItem {
        OwnedItem {
            item,
            active_protocols,
            potential_savings,
        }
    }

    #[test]
    fn dominant_tie_keeps_first_seen() {
        let counts = tally(["b", "a", "a", "b"].into_iter());
        assert_eq!(counts, vec![("b", 2), ("a", 2)]);
        assert_eq!(dominant(&counts), Some(("b", 2)));
        assert_eq!(dominant::<&str>(&[]), None);
    }

    #[test]
    fn summary_of_empty_inventory_is_zeroed() {
        let summary = summarize_inventory(&[], 0);
        assert_eq!(summary.catalog_coverage_percent, 0);
        assert_eq!(summary.average_cost_per_application, 0.0);
        assert!(summary.dominant_family.is_none());
        assert!(summary.dominant_house.is_none());
    }

    #[test]
    fn summary_counts_families_and_houses() {
        let entries = vec![
            owned(item("A", "Maison", Family::Woody, 80.0), 2, 100.0),
            owned(item("B", "Atelier", Family::Citrus, 120.0), 0, 0.0),
            owned(item("C", "Atelier", Family::Woody, 100.0), 1, 50.5),
        ];
        let summary = summarize_inventory(&entries, 8);
        assert_eq!(summary.catalog_coverage_percent, 38);
        assert_eq!(summary.retail_value, 300.0);
        assert_eq!(summary.fiscal_value, 150.5);
        assert_eq!(
            summary.dominant_family,
            Some(FamilyCount {
                family: Family::Woody,
                count: 2
            })
        );
        assert_eq!(summary.dominant_house.map(|house| house.house), Some("Atelier".to_string()));
        assert_eq!(summary.average_cost_per_application, 0.1);

        let by_house = group_by_house(&entries);
        assert_eq!(by_house[0].house, "Maison");
        assert_eq!(by_house[1].items.len(), 2);

        let by_family = group_by_family(&entries);
        assert_eq!(by_family[0].family, Family::Citrus);
        assert_eq!(by_family[1].items.len(), 2);

        let ranked = top_value(&entries, 2);
        assert_eq!(ranked[0].item.id, "A");
        assert_eq!(ranked[1].item.id, "C");
        assert_eq!(unused(&entries)[0].item.id, "B");
    }

    #[test]
    fn family_score_steps_down_with_presence() {
        assert_eq!(family_score(Family::Leather, 0).0, 50);
        assert_eq!(family_score(Family::Leather, 2).0, 30);
        assert_eq!(family_score(Family::Leather, 3).0, 10);
        assert!(family_score(Family::Leather, 0).1.contains("Leather"));
    }
}
