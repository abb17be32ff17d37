//! Combinatorial protocol generator.
//!
//! # Responsibility
//! - Enumerate 2- and 3-item combinations of the active inventory.
//! - Score each combination, match it to a reference and assemble the six pillars.
//! - Rank the survivors and keep the best `target`.
//!
//! # Invariants
//! - Enumeration order is nested ascending indices (pairs first, then triples).
//!   Names, categories and ranking ties all depend on it.
//! - Discards are counted, never raised.
//! - Returned protocols carry sequential ids starting after `id_offset`.
//!
//! # See also
//! - engine/sync.rs for incremental regeneration after inventory changes.

use super::compatibility::{
    conflict_risk, distinct_families, synergy_description, total_compatibility,
};
use super::fiscal::{build_cost_analysis, FiscalError, SprayApplication};
use super::matcher::find_best_matches;
use crate::catalog::Catalog;
use crate::config::{GeneratorConfig, RankingWeights};
use crate::model::fragrance::{Concentration, Family, FragranceItem};
use crate::model::protocol::{
    format_protocol_id, ApplicationStep, BodyZone, ChemicalCompatibility, LayerRole,
    LayeringProtocol, Provenance, ProtocolRecord, ScheduleStep, StepAction, TechniquePlan,
    TimeFactor, ValidationError,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::time::Instant;

const NAME_PREFIXES: &[&str] = &[
    "Protocol", "Operation", "Mission", "Project", "Code", "Synthesis", "Formula", "Sequence",
    "Vector", "Nexus", "Matrix", "Index", "Signal", "Pulse", "Wave", "Arc", "Axis", "Prism",
    "Vortex", "Spectrum",
];

const CODENAMES: &[&str] = &[
    "Omega", "Alpha", "Zenith", "Eclipse", "Phoenix", "Nebula", "Quasar", "Solstice", "Equinox",
    "Aurora", "Titan", "Chronos", "Atlas", "Helios", "Morpheus", "Obsidian", "Platinum",
    "Titanium", "Onyx", "Ivory", "Velvet", "Silk", "Amber", "Sable", "Crimson", "Midnight",
    "Twilight", "Dawn", "Dusk", "Horizon", "Cascade", "Tempest", "Mirage", "Phantom", "Specter",
    "Cipher", "Enigma", "Oracle", "Sentinel", "Apex", "Vertex", "Zenon", "Sigma", "Delta",
    "Gamma", "Luxor", "Versailles", "Monaco", "Amalfi", "Portofino", "Kashmir", "Bosphorus",
    "Riviera", "Toscana", "Marrakech", "Serenity", "Majesty", "Opulence", "Grandeur", "Elegance",
    "Noir", "Blanche", "Rouge", "Dorado", "Azur",
];

const CATEGORIES: &[&str] = &[
    "Night Seduction",
    "Mediterranean Freshness",
    "Executive Power",
    "Classic Elegance",
    "Urban Adventure",
    "Oriental Ritual",
    "Coastal Breeze",
    "Winter Gala",
    "Golden Sunset",
    "Dark Mystery",
    "Parisian Sophistication",
    "Morning Energy",
    "Intimate Encounter",
    "Night Cocktail",
    "Sunday Stroll",
    "Business Meeting",
    "Romantic Date",
    "Weekend Getaway",
    "Red Carpet Event",
    "Summer Day",
];

/// Deterministic operation name for a 0-based index.
pub fn protocol_name(index: usize) -> String {
    let prefix = NAME_PREFIXES[index % NAME_PREFIXES.len()];
    let codename = CODENAMES[(index / NAME_PREFIXES.len()) % CODENAMES.len()];
    let round = index / (NAME_PREFIXES.len() * CODENAMES.len());
    if round > 0 {
        format!("{prefix} {codename} {}", round + 1)
    } else {
        format!("{prefix} {codename}")
    }
}

/// Category picked by hashing the combination's family labels.
pub fn protocol_category(items: &[&FragranceItem]) -> &'static str {
    let label_len: usize = items
        .iter()
        .map(|item| item.family.label().chars().count())
        .sum();
    CATEGORIES[(label_len + items.len()) % CATEGORIES.len()]
}

/// Sprays per layer: concentration baseline, +1 on the base layer,
/// -1 (never below 1) on non-base layers of a 3-item plan.
pub fn spray_count(concentration: Concentration, role: LayerRole, layers: usize) -> u32 {
    let mut sprays: u32 = match concentration {
        Concentration::Cologne => 3,
        Concentration::Edt | Concentration::EdtIntense | Concentration::Edp => 2,
        Concentration::Parfum => 1,
    };
    if role == LayerRole::Base {
        sprays += 1;
    } else if layers >= 3 {
        sprays = sprays.saturating_sub(1).max(1);
    }
    sprays
}

/// Base layers go on warm zones, bridges on pulse points, closers on projection zones.
pub fn zone_for(role: LayerRole) -> BodyZone {
    match role {
        LayerRole::Base => BodyZone::Chest,
        LayerRole::Bridge => BodyZone::Neck,
        LayerRole::Closing => BodyZone::BehindEars,
    }
}

fn role_for(position: usize, layers: usize) -> LayerRole {
    if position == 0 {
        LayerRole::Base
    } else if position + 1 == layers {
        LayerRole::Closing
    } else {
        LayerRole::Bridge
    }
}

fn layer_note(role: LayerRole) -> &'static str {
    match role {
        LayerRole::Base => "Base layer: apply first to anchor the layering",
        LayerRole::Bridge => "Middle layer: builds the olfactory bridge",
        LayerRole::Closing => "Closing layer: seals the final accord",
    }
}

/// Most frequent family; ties go to the earliest item.
pub fn dominant_family(items: &[&FragranceItem]) -> Option<Family> {
    let families = items.iter().map(|item| item.family).collect::<Vec<_>>();
    let mut best: Option<(Family, usize)> = None;
    for family in &families {
        let count = families.iter().filter(|other| *other == family).count();
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((*family, count));
        }
    }
    best.map(|(family, _)| family)
}

/// Lexicographic k-combinations of `0..n`, as index vectors.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    started: bool,
    exhausted: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            started: false,
            exhausted: k == 0 || k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }

        let k = self.indices.len();
        let Some(pivot) = (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) else {
            self.exhausted = true;
            return None;
        };
        self.indices[pivot] += 1;
        for i in (pivot + 1)..k {
            self.indices[i] = self.indices[i - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

/// Why a combination did not become a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Discard {
    LowCompatibility(f64),
    NoReference,
    CostAnalysis(FiscalError),
    Invalid(ValidationError),
}

/// Counters of one generation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub attempted: usize,
    pub pair_candidates: usize,
    pub triple_candidates: usize,
    pub discarded_low_compatibility: usize,
    pub discarded_no_reference: usize,
    pub discarded_cost_analysis: usize,
    pub discarded_invalid: usize,
    pub selected: usize,
}

impl GenerationStats {
    fn record_discard(&mut self, discard: &Discard) {
        match discard {
            Discard::LowCompatibility(_) => self.discarded_low_compatibility += 1,
            Discard::NoReference => self.discarded_no_reference += 1,
            Discard::CostAnalysis(_) => self.discarded_cost_analysis += 1,
            Discard::Invalid(_) => self.discarded_invalid += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub protocols: Vec<LayeringProtocol>,
    pub stats: GenerationStats,
}

/// Builds ranked protocols from fragrance combinations.
#[derive(Debug, Clone)]
pub struct ProtocolGenerator {
    catalog: Catalog,
    config: GeneratorConfig,
    weights: RankingWeights,
}

impl ProtocolGenerator {
    pub fn new(catalog: Catalog, config: GeneratorConfig, weights: RankingWeights) -> Self {
        Self {
            catalog,
            config,
            weights,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Runs a full pass over `items` and keeps the best `target` protocols.
    ///
    /// Inactive items are ignored. Ids and names start after `id_offset`.
    pub fn generate(
        &self,
        items: &[&FragranceItem],
        target: usize,
        id_offset: usize,
        created_at: DateTime<Utc>,
    ) -> Generation {
        let started_at = Instant::now();
        let active = items
            .iter()
            .copied()
            .filter(|item| item.active)
            .collect::<Vec<_>>();
        let mut stats = GenerationStats::default();

        if active.len() < 2 || target == 0 {
            info!(
                "event=protocol_generate module=generator status=skip items={} target={}",
                active.len(),
                target
            );
            return Generation {
                protocols: Vec::new(),
                stats,
            };
        }

        let mut candidates = Vec::new();
        let mut global_index = 0usize;

        for combo in Combinations::new(active.len(), 2) {
            if stats.pair_candidates >= self.config.pair_candidate_cap {
                break;
            }
            let picked = combo.iter().map(|&i| active[i]).collect::<Vec<_>>();
            stats.attempted += 1;
            match self.build_protocol(&picked, global_index, created_at) {
                Ok(protocol) => {
                    candidates.push(protocol);
                    stats.pair_candidates += 1;
                }
                Err(discard) => stats.record_discard(&discard),
            }
            global_index += 1;
        }

        let mut triple_attempts = 0usize;
        for combo in Combinations::new(active.len(), 3) {
            if stats.triple_candidates >= self.config.triple_candidate_cap
                || triple_attempts >= self.config.triple_attempt_cap
            {
                break;
            }
            triple_attempts += 1;
            let picked = combo.iter().map(|&i| active[i]).collect::<Vec<_>>();
            stats.attempted += 1;
            match self.build_protocol(&picked, global_index, created_at) {
                Ok(protocol) => {
                    candidates.push(protocol);
                    stats.triple_candidates += 1;
                }
                Err(discard) => stats.record_discard(&discard),
            }
            global_index += 1;
        }

        debug!(
            "event=protocol_generate module=generator status=discards low_compatibility={} no_reference={} cost_analysis={} invalid={}",
            stats.discarded_low_compatibility,
            stats.discarded_no_reference,
            stats.discarded_cost_analysis,
            stats.discarded_invalid
        );

        let protocols = self.rank(candidates, target, id_offset);
        stats.selected = protocols.len();

        info!(
            "event=protocol_generate module=generator status=ok items={} attempted={} pairs={} triples={} selected={} duration_ms={}",
            active.len(),
            stats.attempted,
            stats.pair_candidates,
            stats.triple_candidates,
            stats.selected,
            started_at.elapsed().as_millis()
        );

        Generation { protocols, stats }
    }

    /// Assembles one combination into a protocol, or says why it was dropped.
    pub fn build_protocol(
        &self,
        items: &[&FragranceItem],
        index: usize,
        created_at: DateTime<Utc>,
    ) -> Result<LayeringProtocol, Discard> {
        let compatibility = total_compatibility(items);
        if compatibility.score < self.config.min_compatibility {
            return Err(Discard::LowCompatibility(compatibility.score));
        }

        let pooled_notes = items
            .iter()
            .flat_map(|item| item.lowercase_notes())
            .collect::<Vec<_>>();
        let best = find_best_matches(&self.catalog, &pooled_notes, dominant_family(items), 1)
            .into_iter()
            .next()
            .ok_or(Discard::NoReference)?;

        let technique = self.technique_plan(items);
        let applications = technique
            .steps
            .iter()
            .map(|step| SprayApplication::new(step.fragrance_id.clone(), step.spray_count))
            .collect::<Vec<_>>();
        let cost_analysis = build_cost_analysis(&self.catalog, &best.reference.id, &applications)
            .map_err(Discard::CostAnalysis)?;
        let time_factor = self.time_factor(items, &technique);

        let families = items.iter().map(|item| item.family).collect::<Vec<_>>();
        let synergy = synergy_description(&families);
        let chemistry = ChemicalCompatibility::new(
            compatibility.score,
            compatibility.shared_notes,
            distinct_families(&families),
            synergy.clone(),
            conflict_risk(&families).risk,
        );

        let names = items
            .iter()
            .map(|item| item.name.as_str())
            .collect::<Vec<_>>()
            .join(" + ");
        let description = format!(
            "Emulation of {} {} ({}% match) using {names}. {synergy}",
            best.reference.house,
            best.reference.name,
            best.score.round()
        );

        LayeringProtocol::new(ProtocolRecord {
            id: format_protocol_id(index + 1),
            name: protocol_name(index),
            description,
            category: protocol_category(items).to_string(),
            assets: items.iter().map(|item| item.id.clone()).collect(),
            cost_analysis: Some(cost_analysis),
            technique: Some(technique),
            time_factor: Some(time_factor),
            compatibility: Some(chemistry),
            created_at,
            favorite: false,
            times_used: 0,
            active: true,
            provenance: Provenance::Algorithm,
            deactivation_reason: None,
        })
        .map_err(Discard::Invalid)
    }

    fn technique_plan(&self, items: &[&FragranceItem]) -> TechniquePlan {
        let layers = items.len();
        let steps = items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let role = role_for(position, layers);
                ApplicationStep {
                    fragrance_id: item.id.clone(),
                    order: position as u32 + 1,
                    role,
                    zone: zone_for(role),
                    spray_count: spray_count(item.concentration, role, layers),
                    distance_cm: self.config.spray_distance_cm,
                    note: layer_note(role).to_string(),
                }
            })
            .collect();
        TechniquePlan::new(steps)
    }

    fn time_factor(&self, items: &[&FragranceItem], technique: &TechniquePlan) -> TimeFactor {
        let apply_seconds = self.config.application_seconds_per_step;
        let drying_seconds = self.config.drying_seconds;
        let mut schedule = Vec::with_capacity(technique.steps.len() * 2);
        let mut total = 0;

        for (position, step) in technique.steps.iter().enumerate() {
            let label = items
                .get(position)
                .map_or_else(|| step.fragrance_id.clone(), |item| item.display_name());
            schedule.push(ScheduleStep {
                layer: step.order,
                action: StepAction::Apply,
                description: format!(
                    "Apply {} sprays of {label} on {} ({}cm)",
                    step.spray_count,
                    step.zone.label(),
                    step.distance_cm
                ),
                seconds: apply_seconds,
            });
            total += apply_seconds;

            if position + 1 < technique.steps.len() {
                schedule.push(ScheduleStep {
                    layer: step.order,
                    action: StepAction::Dry,
                    description: format!(
                        "Wait {drying_seconds}s for drying before the next layer"
                    ),
                    seconds: drying_seconds,
                });
                total += drying_seconds;
            }
        }

        let mean_hours = items
            .iter()
            .map(|item| f64::from(item.concentration.longevity_hours()))
            .sum::<f64>()
            / items.len().max(1) as f64;
        let longevity = (mean_hours * self.config.longevity_multiplier).round();
        let peak = (longevity * self.config.peak_fraction).round();

        TimeFactor {
            drying_seconds,
            total_application_seconds: total,
            development_minutes: self.config.development_minutes,
            longevity_hours: longevity as u32,
            peak_sillage_hours: peak as u32,
            schedule,
        }
    }

    /// Composite score of one candidate against the best savings in the pool.
    pub fn ranking_score(&self, protocol: &LayeringProtocol, max_savings: f64) -> f64 {
        let analysis = protocol.cost_analysis();
        protocol.compatibility().score * self.weights.compatibility
            + (analysis.savings / max_savings) * 100.0 * self.weights.savings
            + analysis.savings_percent * self.weights.savings_percent
    }

    /// Sorts candidates by composite score, keeps `target` and renumbers them.
    pub fn rank(
        &self,
        candidates: Vec<LayeringProtocol>,
        target: usize,
        id_offset: usize,
    ) -> Vec<LayeringProtocol> {
        let max_savings = candidates
            .iter()
            .map(|protocol| protocol.cost_analysis().savings)
            .fold(1.0_f64, f64::max);

        let mut scored = candidates
            .into_iter()
            .map(|protocol| (self.ranking_score(&protocol, max_savings), protocol))
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(target)
            .enumerate()
            .filter_map(|(rank, (_, protocol))| {
                let sequence = id_offset + rank;
                match protocol.with_identity(format_protocol_id(sequence + 1), protocol_name(sequence)) {
                    Ok(renamed) => Some(renamed),
                    Err(err) => {
                        warn!(
                            "event=protocol_rank module=generator status=skip error_code=rename_failed error={err}"
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fragrance::FragranceRecord;

    #[test]
    fn combinations_follow_nested_ascending_order() {
        let pairs = Combinations::new(4, 2).collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(Combinations::new(5, 3).count(), 10);
        assert_eq!(Combinations::new(1, 2).count(), 0);
        assert_eq!(Combinations::new(3, 0).count(), 0);
    }

    #[test]
    fn names_cycle_prefixes_then_codenames() {
        assert_eq!(protocol_name(0), "Protocol Omega");
        assert_eq!(protocol_name(1), "Operation Omega");
        assert_eq!(protocol_name(20), "Protocol Alpha");
        assert_eq!(protocol_name(20 * 65), "Protocol Omega 2");
    }

    #[test]
    fn spray_table_adjusts_for_role_and_size() {
        assert_eq!(spray_count(Concentration::Edt, LayerRole::Base, 2), 3);
        assert_eq!(spray_count(Concentration::Edt, LayerRole::Closing, 2), 2);
        assert_eq!(spray_count(Concentration::Edt, LayerRole::Bridge, 3), 1);
        assert_eq!(spray_count(Concentration::Parfum, LayerRole::Closing, 3), 1);
        assert_eq!(spray_count(Concentration::Cologne, LayerRole::Base, 3), 4);
    }

    #[test]
    fn category_hash_counts_label_characters() {
        let item = |id: &str, family: Family| {
            FragranceItem::new(FragranceRecord {
                id: id.to_string(),
                name: id.to_string(),
                house: "House".to_string(),
                family,
                subfamily: None,
                concentration: Concentration::Edt,
                volume_ml: 100.0,
                retail_price: 80.0,
                top_notes: vec!["lavender".to_string()],
                heart_notes: Vec::new(),
                base_notes: Vec::new(),
                active: true,
            })
            .unwrap()
        };
        let fougere = item("F", Family::Fougere);
        let woody = item("W", Family::Woody);

        // "Fougère" is 7 characters, 8 bytes.
        assert_eq!(
            protocol_category(&[&fougere, &woody]),
            CATEGORIES[(7 + 5 + 2) % CATEGORIES.len()]
        );
    }
}
