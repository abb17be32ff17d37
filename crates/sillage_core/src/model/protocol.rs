//! Layering protocol aggregate and its pillar value objects.
//!
//! # Responsibility
//! - Define the six-pillar protocol record produced by the generator.
//! - Refuse construction when a pillar is missing or the asset set is too small.
//! - Provide the JSON wire shape used by persistence and export.
//!
//! # Invariants
//! - A protocol always references at least two distinct fragrance ids.
//! - Pillar contents never change after construction. Only the `active`,
//!   `favorite` and `times_used` flags move.
//! - `compatibility.tier == Tier::from_score(compatibility.score)`.
//! - Every technique step references a fragrance in the asset set.

use super::fragrance::Family;
use super::round_to;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Stable protocol identifier, formatted `LP-NNNN`.
pub type ProtocolId = String;

/// Prefix of every generated protocol id.
pub const PROTOCOL_ID_PREFIX: &str = "LP-";

/// Formats a 1-based sequence number as a protocol id.
pub fn format_protocol_id(sequence: usize) -> ProtocolId {
    format!("{PROTOCOL_ID_PREFIX}{sequence:04}")
}

/// Parses the sequence number back out of a protocol id.
pub fn protocol_sequence(id: &str) -> Option<usize> {
    id.strip_prefix(PROTOCOL_ID_PREFIX)?.parse().ok()
}

/// A pillar that a serialized record may omit. Identity and assets have
/// dedicated [`ValidationError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pillar {
    CostAnalysis,
    Technique,
    TimeFactor,
    Compatibility,
}

impl Pillar {
    pub const ALL: [Pillar; 4] = [
        Pillar::CostAnalysis,
        Pillar::Technique,
        Pillar::TimeFactor,
        Pillar::Compatibility,
    ];
}

/// Matches the field name in [`ProtocolRecord`].
impl Display for Pillar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CostAnalysis => "cost_analysis",
            Self::Technique => "technique",
            Self::TimeFactor => "time_factor",
            Self::Compatibility => "compatibility",
        };
        f.write_str(name)
    }
}

/// Protocol construction failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("protocol has an empty identifier")]
    EmptyId,
    #[error("protocol `{0}` has an empty name")]
    EmptyName(String),
    #[error("protocol `{id}` is missing pillar `{pillar}`")]
    MissingPillar { id: String, pillar: Pillar },
    #[error("protocol `{id}` needs at least 2 assets, got {count}")]
    InsufficientAssets { id: String, count: usize },
    #[error("protocol `{id}` lists asset `{asset}` more than once")]
    DuplicateAsset { id: String, asset: String },
    #[error("protocol `{id}` has a technique step for `{fragrance_id}` outside its assets")]
    StepOutsideAssets { id: String, fragrance_id: String },
    #[error("protocol `{id}` has tier {stored:?} but score {score} implies {expected:?}")]
    TierMismatch {
        id: String,
        score: f64,
        stored: Tier,
        expected: Tier,
    },
    #[error("protocol `{id}` has compatibility score {score} outside 0..=100")]
    ScoreOutOfRange { id: String, score: f64 },
}

// ── Pillar 3: cost analysis ─────────────────────────────

/// Cost of one fragrance within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub fragrance_id: String,
    /// `house - name` label for display.
    pub label: String,
    pub spray_count: u32,
    pub cost_per_application: f64,
    /// `cost_per_application * spray_count`, rounded to 3 decimals.
    pub subtotal: f64,
}

/// Real cost of a plan against the price of the reference it emulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub reference_id: String,
    pub reference_price: f64,
    pub real_cost: f64,
    pub savings: f64,
    pub savings_percent: f64,
    pub breakdown: Vec<CostLine>,
}

impl CostAnalysis {
    /// Builds the analysis from an itemized breakdown.
    ///
    /// Money values are rounded to 3 decimals, the percentage to 1 decimal.
    pub fn new(
        reference_id: impl Into<String>,
        reference_price: f64,
        real_cost: f64,
        breakdown: Vec<CostLine>,
    ) -> Self {
        let real_cost = round_to(real_cost, 3);
        let savings = reference_price - real_cost;
        let savings_percent = if reference_price > 0.0 {
            savings / reference_price * 100.0
        } else {
            0.0
        };

        Self {
            reference_id: reference_id.into(),
            reference_price,
            real_cost,
            savings: round_to(savings, 3),
            savings_percent: round_to(savings_percent, 1),
            breakdown,
        }
    }

    /// Savings per unit spent. Zero when the plan costs nothing.
    pub fn roi(&self) -> f64 {
        if self.real_cost == 0.0 {
            return 0.0;
        }
        round_to(self.savings / self.real_cost, 2)
    }
}

// ── Pillar 4: technique ─────────────────────────────────

/// Body zone a layer is sprayed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyZone {
    Wrists,
    Neck,
    BehindEars,
    Chest,
    InnerElbows,
    Nape,
    Hair,
    Clothing,
}

impl BodyZone {
    pub fn label(self) -> &'static str {
        match self {
            Self::Wrists => "wrists",
            Self::Neck => "neck",
            Self::BehindEars => "behind the ears",
            Self::Chest => "chest",
            Self::InnerElbows => "inner elbows",
            Self::Nape => "nape",
            Self::Hair => "hair",
            Self::Clothing => "clothing (outer layer)",
        }
    }
}

/// Position of a layer within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    Base,
    Bridge,
    Closing,
}

/// One application in a technique plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStep {
    pub fragrance_id: String,
    /// 1-based sequence order.
    pub order: u32,
    pub role: LayerRole,
    pub zone: BodyZone,
    pub spray_count: u32,
    pub distance_cm: u32,
    pub note: String,
}

/// Ordered application steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechniquePlan {
    pub steps: Vec<ApplicationStep>,
}

impl TechniquePlan {
    pub fn new(steps: Vec<ApplicationStep>) -> Self {
        Self { steps }
    }

    pub fn total_sprays(&self) -> u32 {
        self.steps.iter().map(|step| step.spray_count).sum()
    }
}

// ── Pillar 5: time factor ───────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Apply,
    Dry,
}

/// One line of the application schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStep {
    /// Layer this line belongs to (drying lines share the preceding layer).
    pub layer: u32,
    pub action: StepAction,
    pub description: String,
    pub seconds: u32,
}

/// Timing of the application ritual and projected performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFactor {
    pub drying_seconds: u32,
    pub total_application_seconds: u32,
    pub development_minutes: u32,
    pub longevity_hours: u32,
    pub peak_sillage_hours: u32,
    pub schedule: Vec<ScheduleStep>,
}

// ── Pillar 6: chemical compatibility ────────────────────

/// Quality band derived from the compatibility score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Alpha,
    Beta,
    Gamma,
    Delta,
}

impl Tier {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Alpha
        } else if score >= 75.0 {
            Self::Beta
        } else if score >= 60.0 {
            Self::Gamma
        } else {
            Self::Delta
        }
    }
}

/// Risk of two families clashing on skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalCompatibility {
    /// 0..=100, rounded to 1 decimal.
    pub score: f64,
    pub shared_notes: Vec<String>,
    /// Distinct families, in first-seen order.
    pub families: Vec<Family>,
    pub synergy: String,
    pub conflict_risk: ConflictRisk,
    pub tier: Tier,
}

impl ChemicalCompatibility {
    /// Builds the pillar; the tier is derived from `score`.
    pub fn new(
        score: f64,
        shared_notes: Vec<String>,
        families: Vec<Family>,
        synergy: impl Into<String>,
        conflict_risk: ConflictRisk,
    ) -> Self {
        let score = round_to(score, 1);
        Self {
            score,
            shared_notes,
            families,
            synergy: synergy.into(),
            conflict_risk,
            tier: Tier::from_score(score),
        }
    }
}

// ── Aggregate ───────────────────────────────────────────

/// Who produced a protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Algorithm,
    Manual,
}

/// Wire shape of a protocol. Every pillar is optional here so that a
/// missing one surfaces as a [`ValidationError`] instead of a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub assets: Vec<String>,
    pub cost_analysis: Option<CostAnalysis>,
    pub technique: Option<TechniquePlan>,
    pub time_factor: Option<TimeFactor>,
    pub compatibility: Option<ChemicalCompatibility>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub times_used: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default)]
    pub deactivation_reason: Option<String>,
}

fn default_active() -> bool {
    true
}

/// A validated layering protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProtocolRecord", into = "ProtocolRecord")]
pub struct LayeringProtocol {
    id: ProtocolId,
    name: String,
    description: String,
    category: String,
    assets: Vec<String>,
    cost_analysis: CostAnalysis,
    technique: TechniquePlan,
    time_factor: TimeFactor,
    compatibility: ChemicalCompatibility,
    created_at: DateTime<Utc>,
    favorite: bool,
    times_used: u32,
    active: bool,
    provenance: Provenance,
    deactivation_reason: Option<String>,
}

impl LayeringProtocol {
    /// Validates a record and produces the protocol.
    pub fn new(record: ProtocolRecord) -> Result<Self, ValidationError> {
        let id = record.id;
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if record.name.trim().is_empty() {
            return Err(ValidationError::EmptyName(id));
        }
        let missing = |pillar| ValidationError::MissingPillar {
            id: id.clone(),
            pillar,
        };
        if record.assets.len() < 2 {
            return Err(ValidationError::InsufficientAssets {
                id,
                count: record.assets.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for asset in &record.assets {
            if !seen.insert(asset.as_str()) {
                return Err(ValidationError::DuplicateAsset {
                    id: id.clone(),
                    asset: asset.clone(),
                });
            }
        }

        let cost_analysis = record
            .cost_analysis
            .ok_or_else(|| missing(Pillar::CostAnalysis))?;
        let technique = record
            .technique
            .filter(|plan| !plan.steps.is_empty())
            .ok_or_else(|| missing(Pillar::Technique))?;
        let time_factor = record
            .time_factor
            .ok_or_else(|| missing(Pillar::TimeFactor))?;
        let compatibility = record
            .compatibility
            .ok_or_else(|| missing(Pillar::Compatibility))?;

        if let Some(step) = technique
            .steps
            .iter()
            .find(|step| !seen.contains(step.fragrance_id.as_str()))
        {
            return Err(ValidationError::StepOutsideAssets {
                id,
                fragrance_id: step.fragrance_id.clone(),
            });
        }

        if !(0.0..=100.0).contains(&compatibility.score) {
            return Err(ValidationError::ScoreOutOfRange {
                id,
                score: compatibility.score,
            });
        }
        let expected = Tier::from_score(compatibility.score);
        if compatibility.tier != expected {
            return Err(ValidationError::TierMismatch {
                id,
                score: compatibility.score,
                stored: compatibility.tier,
                expected,
            });
        }

        Ok(Self {
            id,
            name: record.name,
            description: record.description,
            category: record.category,
            assets: record.assets,
            cost_analysis,
            technique,
            time_factor,
            compatibility,
            created_at: record.created_at,
            favorite: record.favorite,
            times_used: record.times_used,
            active: record.active,
            provenance: record.provenance,
            deactivation_reason: record.deactivation_reason,
        })
    }

    /// Rebuilds the protocol under a new identity, keeping every pillar.
    pub fn with_identity(
        &self,
        id: impl Into<ProtocolId>,
        name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let mut record = self.to_record();
        record.id = id.into();
        record.name = name.into();
        Self::new(record)
    }

    pub fn to_record(&self) -> ProtocolRecord {
        self.clone().into()
    }

    /// Plain JSON value, as written to storage.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Reconstructs a protocol from its JSON value, re-running validation.
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn cost_analysis(&self) -> &CostAnalysis {
        &self.cost_analysis
    }

    pub fn technique(&self) -> &TechniquePlan {
        &self.technique
    }

    pub fn time_factor(&self) -> &TimeFactor {
        &self.time_factor
    }

    pub fn compatibility(&self) -> &ChemicalCompatibility {
        &self.compatibility
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite
    }

    pub fn times_used(&self) -> u32 {
        self.times_used
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn deactivation_reason(&self) -> Option<&str> {
        self.deactivation_reason.as_deref()
    }

    /// Whether `fragrance_id` is one of this protocol's assets.
    pub fn uses_item(&self, fragrance_id: &str) -> bool {
        self.assets.iter().any(|asset| asset == fragrance_id)
    }

    /// Order-independent key of the asset set.
    pub fn asset_key(&self) -> String {
        asset_key(&self.assets)
    }

    /// Flips the protocol to inactive, keeping every pillar.
    pub fn deactivate(&mut self, reason: impl Into<String>) {
        self.active = false;
        self.deactivation_reason = Some(reason.into());
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        self.favorite = favorite;
    }

    pub fn record_use(&mut self) {
        self.times_used = self.times_used.saturating_add(1);
    }
}

impl TryFrom<ProtocolRecord> for LayeringProtocol {
    type Error = ValidationError;

    fn try_from(value: ProtocolRecord) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LayeringProtocol> for ProtocolRecord {
    fn from(value: LayeringProtocol) -> Self {
        Self {
            id: value.id,
            name: value.name,
            description: value.description,
            category: value.category,
            assets: value.assets,
            cost_analysis: Some(value.cost_analysis),
            technique: Some(value.technique),
            time_factor: Some(value.time_factor),
            compatibility: Some(value.compatibility),
            created_at: value.created_at,
            favorite: value.favorite,
            times_used: value.times_used,
            active: value.active,
            provenance: value.provenance,
            deactivation_reason: value.deactivation_reason,
        }
    }
}

/// Sorted `|`-joined ids, so `[b, a]` and `[a, b]` share one key.
pub fn asset_key<S: AsRef<str>>(assets: &[S]) -> String {
    let mut ids = assets.iter().map(AsRef::as_ref).collect::<Vec<_>>();
    ids.sort_unstable();
    ids.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_exact() {
        assert_eq!(Tier::from_score(90.0), Tier::Alpha);
        assert_eq!(Tier::from_score(89.9), Tier::Beta);
        assert_eq!(Tier::from_score(75.0), Tier::Beta);
        assert_eq!(Tier::from_score(74.9), Tier::Gamma);
        assert_eq!(Tier::from_score(60.0), Tier::Gamma);
        assert_eq!(Tier::from_score(59.9), Tier::Delta);
        assert_eq!(Tier::from_score(0.0), Tier::Delta);
    }

    #[test]
    fn cost_analysis_rounds_money_to_three_decimals() {
        let analysis = CostAnalysis::new("REF", 350.0, 0.435, Vec::new());
        assert_eq!(analysis.real_cost, 0.435);
        assert_eq!(analysis.savings, 349.565);
        assert_eq!(analysis.savings_percent, 99.9);
    }

    #[test]
    fn cost_analysis_with_free_reference_has_zero_percent() {
        let analysis = CostAnalysis::new("REF", 0.0, 0.2, Vec::new());
        assert_eq!(analysis.savings_percent, 0.0);
        assert_eq!(analysis.savings, -0.2);
    }

    #[test]
    fn asset_key_ignores_order() {
        assert_eq!(asset_key(&["B", "A"]), asset_key(&["A", "B"]));
        assert_eq!(asset_key(&["A", "B", "C"]), "A|B|C");
    }

    #[test]
    fn protocol_ids_are_zero_padded() {
        assert_eq!(format_protocol_id(7), "LP-0007");
        assert_eq!(protocol_sequence("LP-0042"), Some(42));
        assert_eq!(protocol_sequence("X-0042"), None);
    }
}
