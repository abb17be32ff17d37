//! Domain model for the layering engine.
//!
//! # Responsibility
//! - Define catalog items, the six-pillar protocol aggregate and the
//!   savings ledger shapes shared by engine, store and service layers.
//!
//! # Invariants
//! - Catalog items and protocol pillars are immutable once constructed.
//! - Money values carry 3 decimals, percentages 1 decimal.

pub mod fragrance;
pub mod protocol;
pub mod savings;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
