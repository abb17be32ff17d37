//! Olfactory compatibility scoring.
//!
//! # Responsibility
//! - Score family pairs from a fixed symmetric table.
//! - Reward bridge notes and shared notes between items.
//! - Classify conflict risk and describe the synergy of a family set.
//!
//! # Invariants
//! - Every function here is pure; tables are compile-time constants.
//! - `total_compatibility(..).score` is always within `0..=100`.

use crate::model::fragrance::{notes_overlap, Family, FragranceItem};
use crate::model::protocol::ConflictRisk;
use crate::model::round_to;

use Family::{
    Aquatic, Aromatic, Chypre, Citrus, Floral, Fougere, Gourmand, Leather, Oriental, Woody,
};

/// Score for two items of the same family. Kept below 100 to discourage monotony.
pub const SAME_FAMILY_COMPATIBILITY: f64 = 95.0;
/// Score for a pair missing from the table.
pub const UNLISTED_PAIR_COMPATIBILITY: f64 = 50.0;
pub const BRIDGE_BONUS_CAP: u32 = 15;
pub const SHARED_BONUS_CAP: usize = 10;

const FAMILY_MATRIX: &[(Family, Family, f64)] = &[
    (Citrus, Woody, 85.0),
    (Citrus, Oriental, 65.0),
    (Citrus, Floral, 78.0),
    (Citrus, Aquatic, 92.0),
    (Citrus, Aromatic, 88.0),
    (Citrus, Fougere, 82.0),
    (Citrus, Gourmand, 45.0),
    (Citrus, Chypre, 72.0),
    (Citrus, Leather, 55.0),
    (Woody, Oriental, 90.0),
    (Woody, Floral, 80.0),
    (Woody, Aquatic, 75.0),
    (Woody, Aromatic, 88.0),
    (Woody, Fougere, 85.0),
    (Woody, Gourmand, 72.0),
    (Woody, Chypre, 82.0),
    (Woody, Leather, 92.0),
    (Oriental, Floral, 75.0),
    (Oriental, Aquatic, 48.0),
    (Oriental, Aromatic, 70.0),
    (Oriental, Fougere, 68.0),
    (Oriental, Gourmand, 88.0),
    (Oriental, Chypre, 78.0),
    (Oriental, Leather, 85.0),
    (Floral, Aquatic, 70.0),
    (Floral, Aromatic, 65.0),
    (Floral, Fougere, 72.0),
    (Floral, Gourmand, 60.0),
    (Floral, Chypre, 90.0),
    (Floral, Leather, 58.0),
    (Aquatic, Aromatic, 85.0),
    (Aquatic, Fougere, 80.0),
    (Aquatic, Gourmand, 35.0),
    (Aquatic, Chypre, 62.0),
    (Aquatic, Leather, 42.0),
    (Aromatic, Fougere, 90.0),
    (Aromatic, Gourmand, 55.0),
    (Aromatic, Chypre, 70.0),
    (Aromatic, Leather, 65.0),
    (Fougere, Gourmand, 62.0),
    (Fougere, Chypre, 78.0),
    (Fougere, Leather, 70.0),
    (Gourmand, Chypre, 55.0),
    (Gourmand, Leather, 68.0),
    (Chypre, Leather, 75.0),
];

/// Notes known to connect families, with the families each one bridges.
pub const BRIDGE_NOTES: &[(&str, &[Family])] = &[
    ("bergamot", &[Citrus, Aromatic, Fougere, Chypre]),
    ("lavender", &[Aromatic, Fougere, Floral]),
    ("sandalwood", &[Woody, Oriental, Floral]),
    ("cedar", &[Woody, Aromatic, Chypre]),
    ("vetiver", &[Woody, Chypre, Aromatic]),
    ("patchouli", &[Woody, Oriental, Chypre, Gourmand]),
    ("vanilla", &[Oriental, Gourmand, Woody]),
    ("musk", &[Floral, Aquatic, Woody]),
    ("amber", &[Oriental, Woody, Gourmand]),
    ("rose", &[Floral, Chypre, Oriental]),
    ("jasmine", &[Floral, Oriental, Chypre]),
    ("pepper", &[Oriental, Aromatic, Woody]),
    ("cardamom", &[Aromatic, Oriental, Fougere]),
    ("neroli", &[Citrus, Floral, Aquatic]),
    ("tonka bean", &[Gourmand, Oriental, Fougere]),
    ("incense", &[Oriental, Woody, Chypre]),
    ("leather", &[Leather, Woody, Oriental]),
    ("oakmoss", &[Chypre, Fougere, Woody]),
    ("geranium", &[Floral, Aromatic, Citrus]),
    ("cinnamon", &[Oriental, Gourmand, Aromatic]),
];

const SYNERGIES: &[(Family, Family, &str)] = &[
    (Citrus, Woody, "Citrus freshness anchored in noble woods. Vibrant opening with a warm close."),
    (Citrus, Aquatic, "Pure Mediterranean breeze. Lightness and extreme freshness."),
    (Citrus, Aromatic, "Electrifying herbal energy. The modern gentleman's combo."),
    (Woody, Oriental, "Opulent depth. Woods and spices build a magnetic aura."),
    (Woody, Leather, "Refined masculinity. Noble leather over a cedar base."),
    (Oriental, Gourmand, "Addictive dark sweetness. Spices wrapped in honey and vanilla."),
    (Oriental, Leather, "Power and mystery. Oud and leather melt into something magnetic."),
    (Floral, Chypre, "Timeless Parisian elegance. Rose and oakmoss dance together."),
    (Floral, Oriental, "Sensual exoticism. White flowers over oriental spices."),
    (Aquatic, Aromatic, "Côte d'Azur in a bottle. Rosemary and sea salt, pure freedom."),
    (Aromatic, Fougere, "The definitive barbershop. Lavender and herbs in perfect harmony."),
    (Gourmand, Oriental, "Night-time addiction. Vanilla, tonka and amber without remorse."),
    (Fougere, Woody, "Green sophistication. Fern and wood, the classic reinvented."),
    (Chypre, Woody, "Mineral nobility. Oakmoss and cedar, extreme elegance."),
];

const CONFLICT_RULES: &[(Family, Family, ConflictRisk, &str)] = &[
    (Aquatic, Gourmand, ConflictRisk::High, "Marine freshness clashes with heavy sweetness"),
    (Aquatic, Leather, ConflictRisk::High, "Aquatic lightness and leather weight are opposites"),
    (Citrus, Gourmand, ConflictRisk::Medium, "May turn into excessive artificial sweetness"),
    (Floral, Leather, ConflictRisk::Medium, "Polarizing pairing, needs a bridge note"),
];

const NO_CONFLICT_REASON: &str = "No chemical conflicts detected";

/// Score breakdown of a combination.
#[derive(Debug, Clone, PartialEq)]
pub struct CompatibilityScore {
    /// Final score, rounded to 1 decimal and capped at 100.
    pub score: f64,
    /// Mean pairwise family compatibility.
    pub base: f64,
    /// Mean pairwise bridge bonus.
    pub bridge_bonus: f64,
    pub shared_bonus: f64,
    pub shared_notes: Vec<String>,
}

impl CompatibilityScore {
    fn zero() -> Self {
        Self {
            score: 0.0,
            base: 0.0,
            bridge_bonus: 0.0,
            shared_bonus: 0.0,
            shared_notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictAssessment {
    pub risk: ConflictRisk,
    pub reason: &'static str,
}

/// Symmetric base compatibility of two families.
pub fn family_compatibility(a: Family, b: Family) -> f64 {
    if a == b {
        return SAME_FAMILY_COMPATIBILITY;
    }
    FAMILY_MATRIX
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map_or(UNLISTED_PAIR_COMPATIBILITY, |(_, _, score)| *score)
}

/// Bonus for bridge notes present in both items, capped at 15.
///
/// A bridge note counts when some note of each item contains it.
pub fn bridge_bonus(a: &FragranceItem, b: &FragranceItem) -> u32 {
    bridge_bonus_for_notes(a.family, &a.lowercase_notes(), b.family, &b.lowercase_notes())
}

fn bridge_bonus_for_notes(
    family_a: Family,
    notes_a: &[String],
    family_b: Family,
    notes_b: &[String],
) -> u32 {
    let mut bonus = 0;
    for (note, families) in BRIDGE_NOTES {
        let in_a = notes_a.iter().any(|n| n.contains(note));
        let in_b = notes_b.iter().any(|n| n.contains(note));
        if !(in_a && in_b) {
            continue;
        }

        let bridges_a = families.contains(&family_a);
        let bridges_b = families.contains(&family_b);
        bonus += match (bridges_a, bridges_b) {
            (true, true) => 5,
            (true, false) | (false, true) => 3,
            (false, false) => 1,
        };
    }
    bonus.min(BRIDGE_BONUS_CAP)
}

/// Notes of the first item that overlap a note of at least one other item.
///
/// Returned lowercased, in the first item's pyramid order, without repeats.
pub fn shared_notes(items: &[&FragranceItem]) -> Vec<String> {
    let notes = items
        .iter()
        .map(|item| item.lowercase_notes())
        .collect::<Vec<_>>();
    shared_notes_of(&notes)
}

fn shared_notes_of(notes: &[Vec<String>]) -> Vec<String> {
    let Some((first, rest)) = notes.split_first() else {
        return Vec::new();
    };
    if rest.is_empty() {
        return Vec::new();
    }

    let mut shared: Vec<String> = Vec::new();
    for note in first {
        if shared.contains(note) {
            continue;
        }
        let overlaps = rest
            .iter()
            .any(|other| other.iter().any(|candidate| notes_overlap(candidate, note)));
        if overlaps {
            shared.push(note.clone());
        }
    }
    shared
}

/// Overall compatibility of a 2- or 3-item combination.
///
/// `score = base*0.80 + bridge*0.15*6.67 + shared*0.05*10`, rounded to 1
/// decimal and capped at 100. Fewer than two items score 0.
pub fn total_compatibility(items: &[&FragranceItem]) -> CompatibilityScore {
    if items.len() < 2 {
        return CompatibilityScore::zero();
    }

    let notes = items
        .iter()
        .map(|item| item.lowercase_notes())
        .collect::<Vec<_>>();

    let mut family_total = 0.0;
    let mut bridge_total = 0.0;
    let mut pairs = 0.0;
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            family_total += family_compatibility(items[i].family, items[j].family);
            bridge_total += f64::from(bridge_bonus_for_notes(
                items[i].family,
                &notes[i],
                items[j].family,
                &notes[j],
            ));
            pairs += 1.0;
        }
    }

    let base = family_total / pairs;
    let bridge_bonus = bridge_total / pairs;
    let shared_notes = shared_notes_of(&notes);
    let shared_bonus = (shared_notes.len() * 2).min(SHARED_BONUS_CAP) as f64;

    let raw = base * 0.80 + bridge_bonus * 0.15 * 6.67 + shared_bonus * 0.05 * 10.0;

    CompatibilityScore {
        score: round_to(raw, 1).min(100.0),
        base: round_to(base, 1),
        bridge_bonus: round_to(bridge_bonus, 1),
        shared_bonus,
        shared_notes,
    }
}

/// Distinct families in first-seen order.
pub fn distinct_families(families: &[Family]) -> Vec<Family> {
    let mut distinct = Vec::with_capacity(families.len());
    for family in families {
        if !distinct.contains(family) {
            distinct.push(*family);
        }
    }
    distinct
}

/// First matching conflict rule wins; low risk otherwise.
pub fn conflict_risk(families: &[Family]) -> ConflictAssessment {
    CONFLICT_RULES
        .iter()
        .find(|(a, b, _, _)| families.contains(a) && families.contains(b))
        .map_or(
            ConflictAssessment {
                risk: ConflictRisk::Low,
                reason: NO_CONFLICT_REASON,
            },
            |(_, _, risk, reason)| ConflictAssessment {
                risk: *risk,
                reason: *reason,
            },
        )
}

/// Human-readable synergy text for a family set.
pub fn synergy_description(families: &[Family]) -> String {
    let distinct = distinct_families(families);
    match distinct.as_slice() {
        [] => return "Single fragrance, no layering synergy.".to_string(),
        [family] if families.len() >= 2 => {
            return format!(
                "Homogeneous synergy: double strength of the {family} family. Direct amplification."
            );
        }
        [_] => return "Single fragrance, no layering synergy.".to_string(),
        _ => {}
    }

    for i in 0..distinct.len() {
        for j in (i + 1)..distinct.len() {
            let (a, b) = (distinct[i], distinct[j]);
            let found = SYNERGIES
                .iter()
                .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a));
            if let Some((_, _, text)) = found {
                return (*text).to_string();
            }
        }
    }

    let names = distinct
        .iter()
        .map(|family| family.label())
        .collect::<Vec<_>>()
        .join(" + ");
    format!("Experimental fusion of {names}. Uncharted olfactory territory.")
}
