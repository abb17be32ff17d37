#![allow(dead_code)]

use sillage_core::model::fragrance::{
    Concentration, Family, FragranceRecord, ReferenceRecord,
};
use sillage_core::{Catalog, EngineConfig, LayeringService, SqliteKvStore};

pub const WOOD_REFERENCE: &str = "REF-WOOD";
pub const AMBER_REFERENCE: &str = "REF-AMBER";

pub fn fragrance(
    id: &str,
    family: Family,
    concentration: Concentration,
    retail_price: f64,
    notes: [&[&str]; 3],
) -> FragranceRecord {
    let to_vec = |notes: &[&str]| notes.iter().map(|note| note.to_string()).collect();
    FragranceRecord {
        id: id.to_string(),
        name: format!("{id} name"),
        house: format!("{id} house"),
        family,
        subfamily: None,
        concentration,
        volume_ml: 100.0,
        retail_price,
        top_notes: to_vec(notes[0]),
        heart_notes: to_vec(notes[1]),
        base_notes: to_vec(notes[2]),
        active: true,
    }
}

pub fn reference(id: &str, family: Family, retail_price: f64, key_notes: &[&str]) -> ReferenceRecord {
    ReferenceRecord {
        id: id.to_string(),
        name: format!("{id} icon"),
        house: "Maison".to_string(),
        retail_price,
        family,
        key_notes: key_notes.iter().map(|note| note.to_string()).collect(),
        description: String::new(),
    }
}

/// Six items: two close woody ones (85 and 90 per 100ml), an oriental, an
/// aquatic and a gourmand that clash, and a third woody.
pub fn fixture_catalog() -> Catalog {
    Catalog::from_records(
        vec![
            fragrance(
                "A-001",
                Family::Woody,
                Concentration::Edt,
                85.0,
                [&["bergamot"], &["cedar"], &["vetiver"]],
            ),
            fragrance(
                "B-001",
                Family::Woody,
                Concentration::Edt,
                90.0,
                [&["lemon"], &["cedar"], &["oud"]],
            ),
            fragrance(
                "C-001",
                Family::Oriental,
                Concentration::Edp,
                120.0,
                [&["pink pepper"], &["amber"], &["vanilla"]],
            ),
            fragrance(
                "D-001",
                Family::Aquatic,
                Concentration::Edt,
                60.0,
                [&["sea salt"], &["calone"], &["driftwood"]],
            ),
            fragrance(
                "E-001",
                Family::Gourmand,
                Concentration::Edp,
                70.0,
                [&["caramel"], &["praline"], &["tonka"]],
            ),
            fragrance(
                "F-001",
                Family::Woody,
                Concentration::Edp,
                110.0,
                [&["cardamom"], &["sandalwood"], &["oud"]],
            ),
        ],
        vec![
            reference(WOOD_REFERENCE, Family::Woody, 350.0, &["cedar", "oud", "vetiver"]),
            reference(AMBER_REFERENCE, Family::Oriental, 280.0, &["amber", "vanilla", "pink pepper"]),
        ],
    )
    .unwrap()
}

pub fn fixture_config(target_protocols: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.generator.target_protocols = target_protocols;
    config
}

pub fn fixture_service(target_protocols: usize) -> LayeringService<SqliteKvStore> {
    LayeringService::new(
        fixture_catalog(),
        SqliteKvStore::open_in_memory().unwrap(),
        fixture_config(target_protocols),
    )
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} (+/- {tolerance}), got {actual}"
    );
}
