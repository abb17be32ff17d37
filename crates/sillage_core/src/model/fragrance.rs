//! Catalog item models: owned fragrances and the references they emulate.
//!
//! # Responsibility
//! - Define the immutable records loaded from the static catalog.
//! - Derive per-application cost from retail price and bottle volume.
//!
//! # Invariants
//! - `cost_per_application == round3((retail_price / volume_ml) * 0.1)`.
//! - Items are never mutated after load; consumers only hold shared refs.

use super::round_to;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Volume of a single spray, in ml.
pub const SPRAY_VOLUME_ML: f64 = 0.1;

/// Olfactory family of a fragrance or reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Citrus,
    Woody,
    Oriental,
    Floral,
    Aquatic,
    Aromatic,
    Fougere,
    Gourmand,
    Chypre,
    Leather,
}

impl Family {
    pub const ALL: [Family; 10] = [
        Family::Citrus,
        Family::Woody,
        Family::Oriental,
        Family::Floral,
        Family::Aquatic,
        Family::Aromatic,
        Family::Fougere,
        Family::Gourmand,
        Family::Chypre,
        Family::Leather,
    ];

    /// Human-readable label used in generated descriptions.
    pub fn label(self) -> &'static str {
        match self {
            Self::Citrus => "Citrus",
            Self::Woody => "Woody",
            Self::Oriental => "Oriental",
            Self::Floral => "Floral",
            Self::Aquatic => "Aquatic",
            Self::Aromatic => "Aromatic",
            Self::Fougere => "Fougère",
            Self::Gourmand => "Gourmand",
            Self::Chypre => "Chypre",
            Self::Leather => "Leather",
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Concentration tier. Each tier implies a typical longevity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concentration {
    Cologne,
    Edt,
    EdtIntense,
    Edp,
    Parfum,
}

impl Concentration {
    /// Typical wear time on skin, in hours.
    pub fn longevity_hours(self) -> u32 {
        match self {
            Self::Cologne => 3,
            Self::Edt => 6,
            Self::EdtIntense => 8,
            Self::Edp => 9,
            Self::Parfum => 12,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cologne => "Cologne",
            Self::Edt => "EDT",
            Self::EdtIntense => "EDT Intense",
            Self::Edp => "EDP",
            Self::Parfum => "Parfum",
        }
    }
}

/// Serialized shape of a fragrance record before derivation and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragranceRecord {
    pub id: String,
    pub name: String,
    pub house: String,
    pub family: Family,
    #[serde(default)]
    pub subfamily: Option<String>,
    pub concentration: Concentration,
    pub volume_ml: f64,
    pub retail_price: f64,
    #[serde(default)]
    pub top_notes: Vec<String>,
    #[serde(default)]
    pub heart_notes: Vec<String>,
    #[serde(default)]
    pub base_notes: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Reason a catalog record was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("record has an empty id")]
    EmptyId,
    #[error("record `{0}` has an empty name or house")]
    MissingName(String),
    #[error("record `{id}` has non-positive volume {volume_ml}")]
    InvalidVolume { id: String, volume_ml: f64 },
    #[error("record `{id}` has negative price {price}")]
    NegativePrice { id: String, price: f64 },
    #[error("reference `{0}` has no key notes")]
    NoKeyNotes(String),
    #[error("record `{0}` has a blank note")]
    BlankNote(String),
}

fn has_blank_note<'a>(mut notes: impl Iterator<Item = &'a String>) -> bool {
    notes.any(|note| note.trim().is_empty())
}

/// An owned fragrance as known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FragranceRecord")]
pub struct FragranceItem {
    pub id: String,
    pub name: String,
    pub house: String,
    pub family: Family,
    pub subfamily: Option<String>,
    pub concentration: Concentration,
    pub volume_ml: f64,
    pub retail_price: f64,
    pub top_notes: Vec<String>,
    pub heart_notes: Vec<String>,
    pub base_notes: Vec<String>,
    /// Cost of one spray, derived from price and volume.
    pub cost_per_application: f64,
    pub active: bool,
}

impl FragranceItem {
    /// Validates a raw record and derives the per-application cost.
    pub fn new(record: FragranceRecord) -> Result<Self, RecordError> {
        if record.id.trim().is_empty() {
            return Err(RecordError::EmptyId);
        }
        if record.name.trim().is_empty() || record.house.trim().is_empty() {
            return Err(RecordError::MissingName(record.id));
        }
        if record.volume_ml <= 0.0 || !record.volume_ml.is_finite() {
            return Err(RecordError::InvalidVolume {
                id: record.id,
                volume_ml: record.volume_ml,
            });
        }
        if record.retail_price < 0.0 || !record.retail_price.is_finite() {
            return Err(RecordError::NegativePrice {
                id: record.id,
                price: record.retail_price,
            });
        }
        if has_blank_note(
            record
                .top_notes
                .iter()
                .chain(&record.heart_notes)
                .chain(&record.base_notes),
        ) {
            return Err(RecordError::BlankNote(record.id));
        }

        let cost_per_application =
            round_to((record.retail_price / record.volume_ml) * SPRAY_VOLUME_ML, 3);

        Ok(Self {
            id: record.id,
            name: record.name,
            house: record.house,
            family: record.family,
            subfamily: record.subfamily,
            concentration: record.concentration,
            volume_ml: record.volume_ml,
            retail_price: record.retail_price,
            top_notes: record.top_notes,
            heart_notes: record.heart_notes,
            base_notes: record.base_notes,
            cost_per_application,
            active: record.active,
        })
    }

    /// All notes in pyramid order: top, heart, base.
    pub fn all_notes(&self) -> impl Iterator<Item = &str> + '_ {
        self.top_notes
            .iter()
            .chain(self.heart_notes.iter())
            .chain(self.base_notes.iter())
            .map(String::as_str)
    }

    /// Lowercased notes, used by every substring matcher.
    pub fn lowercase_notes(&self) -> Vec<String> {
        self.all_notes().map(str::to_lowercase).collect()
    }

    /// `house name`, as shown in schedules and breakdowns.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.house, self.name)
    }
}

impl TryFrom<FragranceRecord> for FragranceItem {
    type Error = RecordError;

    fn try_from(value: FragranceRecord) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Serialized shape of a reference record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: String,
    pub name: String,
    pub house: String,
    pub retail_price: f64,
    pub family: Family,
    #[serde(default)]
    pub key_notes: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// An expensive product that layering combinations try to emulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReferenceRecord")]
pub struct ReferenceItem {
    pub id: String,
    pub name: String,
    pub house: String,
    pub retail_price: f64,
    pub family: Family,
    pub key_notes: Vec<String>,
    pub description: String,
}

impl ReferenceItem {
    pub fn new(record: ReferenceRecord) -> Result<Self, RecordError> {
        if record.id.trim().is_empty() {
            return Err(RecordError::EmptyId);
        }
        if record.name.trim().is_empty() || record.house.trim().is_empty() {
            return Err(RecordError::MissingName(record.id));
        }
        if record.retail_price < 0.0 || !record.retail_price.is_finite() {
            return Err(RecordError::NegativePrice {
                id: record.id,
                price: record.retail_price,
            });
        }
        if record.key_notes.is_empty() {
            return Err(RecordError::NoKeyNotes(record.id));
        }
        if has_blank_note(record.key_notes.iter()) {
            return Err(RecordError::BlankNote(record.id));
        }

        Ok(Self {
            id: record.id,
            name: record.name,
            house: record.house,
            retail_price: record.retail_price,
            family: record.family,
            key_notes: record.key_notes,
            description: record.description,
        })
    }
}

impl TryFrom<ReferenceRecord> for ReferenceItem {
    type Error = RecordError;

    fn try_from(value: ReferenceRecord) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Case-insensitive containment in either direction.
///
/// Both inputs are expected to be lowercased already. A blank note overlaps nothing.
pub fn notes_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(b) || b.contains(a)
}
