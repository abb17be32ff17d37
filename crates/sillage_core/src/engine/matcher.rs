//! Reference matching: which expensive product does a combination emulate?
//!
//! # Invariants
//! - Ties keep catalog load order (stable sort).
//! - Scores stay within `0..=100`.

use crate::catalog::Catalog;
use crate::model::fragrance::{notes_overlap, Family, ReferenceItem};
use crate::model::round_to;

/// Bonus applied when a reference shares the combination's dominant family.
pub const FAMILY_MATCH_BONUS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceMatch<'a> {
    pub reference: &'a ReferenceItem,
    pub score: f64,
}

/// Percentage of the reference's key notes found among `combo_notes`.
///
/// Matching is case-insensitive containment in either direction, so
/// `vanilla` matches `madagascar vanilla` and vice versa.
pub fn emulation_score<S: AsRef<str>>(combo_notes: &[S], reference: &ReferenceItem) -> f64 {
    if reference.key_notes.is_empty() {
        return 0.0;
    }

    let combo = combo_notes
        .iter()
        .map(|note| note.as_ref().to_lowercase())
        .collect::<Vec<_>>();
    let matches = reference
        .key_notes
        .iter()
        .filter(|key| {
            let key = key.to_lowercase();
            combo.iter().any(|note| notes_overlap(note, &key))
        })
        .count();

    let score = matches as f64 / reference.key_notes.len() as f64 * 100.0;
    round_to(score, 1).min(100.0)
}

/// Scores every catalog reference and returns the best `top_n`.
pub fn find_best_matches<'a, S: AsRef<str>>(
    catalog: &'a Catalog,
    combo_notes: &[S],
    preferred_family: Option<Family>,
    top_n: usize,
) -> Vec<ReferenceMatch<'a>> {
    let mut scored = catalog
        .references()
        .iter()
        .map(|reference| {
            let mut score = emulation_score(combo_notes, reference);
            if preferred_family == Some(reference.family) {
                score = (score + FAMILY_MATCH_BONUS).min(100.0);
            }
            ReferenceMatch { reference, score }
        })
        .collect::<Vec<_>>();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_n);
    scored
}
