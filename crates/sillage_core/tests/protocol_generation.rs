mod common;

use chrono::Utc;
use common::{fixture_catalog, fixture_config};
use sillage_core::engine::generator::{Discard, ProtocolGenerator};
use sillage_core::model::protocol::{
    format_protocol_id, BodyZone, LayerRole, Pillar, Provenance,
};
use sillage_core::{Catalog, LayeringProtocol, ValidationError};
use std::collections::HashSet;

fn generator_for(catalog: &Catalog, target: usize) -> ProtocolGenerator {
    ProtocolGenerator::new(
        catalog.clone(),
        fixture_config(target).generator,
        Default::default(),
    )
}

#[test]
fn builtin_catalog_yields_full_ranked_set() {
    let catalog = Catalog::builtin().unwrap();
    let generator = generator_for(&catalog, 500);
    let items = catalog.fragrances().iter().collect::<Vec<_>>();

    let generation = generator.generate(&items, 500, 0, Utc::now());
    let protocols = &generation.protocols;
    assert_eq!(protocols.len(), 500);
    assert_eq!(generation.stats.selected, 500);
    assert!(generation.stats.pair_candidates <= 1200);
    assert!(generation.stats.triple_candidates <= 200);

    for (rank, protocol) in protocols.iter().enumerate() {
        assert_eq!(protocol.id(), format_protocol_id(rank + 1));
        assert!(protocol.assets().len() >= 2);
        assert!(protocol.compatibility().score >= 45.0);
        assert!(protocol.is_active());
        assert_eq!(protocol.provenance(), Provenance::Algorithm);
    }

    let keys = protocols
        .iter()
        .map(LayeringProtocol::asset_key)
        .collect::<HashSet<_>>();
    assert_eq!(keys.len(), protocols.len());

    let names = protocols
        .iter()
        .map(|protocol| protocol.name().to_string())
        .collect::<HashSet<_>>();
    assert_eq!(names.len(), protocols.len());
}

#[test]
fn clashing_pair_below_threshold_never_appears() {
    let catalog = fixture_catalog();
    let generator = generator_for(&catalog, 50);
    let aquatic = catalog.fragrance("D-001").unwrap();
    let gourmand = catalog.fragrance("E-001").unwrap();

    let discard = generator
        .build_protocol(&[aquatic, gourmand], 0, Utc::now())
        .unwrap_err();
    assert!(matches!(discard, Discard::LowCompatibility(score) if score < 45.0));

    let items = catalog.fragrances().iter().collect::<Vec<_>>();
    let generation = generator.generate(&items, 50, 0, Utc::now());
    assert!(generation.stats.discarded_low_compatibility > 0);
    assert!(generation
        .protocols
        .iter()
        .all(|protocol| protocol.asset_key() != "D-001|E-001"));
    let min_score = generation
        .protocols
        .iter()
        .map(|protocol| protocol.compatibility().score)
        .fold(f64::INFINITY, f64::min);
    assert!(min_score >= 45.0);
}

#[test]
fn ranking_renumbers_after_offset() {
    let catalog = fixture_catalog();
    let generator = generator_for(&catalog, 3);
    let items = catalog.fragrances().iter().collect::<Vec<_>>();

    let generation = generator.generate(&items, 3, 41, Utc::now());
    let ids = generation
        .protocols
        .iter()
        .map(|protocol| protocol.id().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["LP-0042", "LP-0043", "LP-0044"]);
}

#[test]
fn triples_use_base_bridge_closing_zones() {
    let catalog = fixture_catalog();
    let generator = generator_for(&catalog, 10);
    let picked = ["A-001", "B-001", "F-001"]
        .iter()
        .map(|id| catalog.fragrance(id).unwrap())
        .collect::<Vec<_>>();

    let protocol = generator.build_protocol(&picked, 0, Utc::now()).unwrap();
    let steps = &protocol.technique().steps;
    let roles = steps.iter().map(|step| step.role).collect::<Vec<_>>();
    assert_eq!(roles, vec![LayerRole::Base, LayerRole::Bridge, LayerRole::Closing]);
    let zones = steps.iter().map(|step| step.zone).collect::<Vec<_>>();
    assert_eq!(zones, vec![BodyZone::Chest, BodyZone::Neck, BodyZone::BehindEars]);
    assert!(steps.iter().all(|step| step.distance_cm == 15));

    let sprays = steps.iter().map(|step| step.spray_count).collect::<Vec<_>>();
    assert_eq!(sprays[0], 3);
    assert!(sprays.iter().all(|count| *count >= 1));

    let time = protocol.time_factor();
    assert_eq!(time.drying_seconds, 45);
    assert_eq!(time.total_application_seconds, 3 * 5 + 2 * 45);
    assert_eq!(time.schedule.len(), 5);
    assert_eq!(time.peak_sillage_hours, (f64::from(time.longevity_hours) * 0.25).round() as u32);
}

#[test]
fn protocol_json_round_trip_keeps_every_pillar() {
    let catalog = fixture_catalog();
    let generator = generator_for(&catalog, 5);
    let items = catalog.fragrances().iter().collect::<Vec<_>>();
    let protocol = generator.generate(&items, 5, 0, Utc::now()).protocols[0].clone();

    let value = protocol.to_json().unwrap();
    assert_eq!(value["id"], "LP-0001");
    assert!(value["technique"].is_array());
    assert!(value["cost_analysis"]["breakdown"].is_array());
    assert_eq!(value["active"], true);

    let restored = LayeringProtocol::from_json(value).unwrap();
    assert_eq!(restored, protocol);
}

#[test]
fn construction_rejects_missing_pillars_and_short_asset_sets() {
    let catalog = fixture_catalog();
    let generator = generator_for(&catalog, 5);
    let items = catalog.fragrances().iter().collect::<Vec<_>>();
    let protocol = generator.generate(&items, 5, 0, Utc::now()).protocols[0].clone();

    let mut single = protocol.to_record();
    single.assets.truncate(1);
    assert!(matches!(
        LayeringProtocol::new(single),
        Err(ValidationError::InsufficientAssets { count: 1, .. })
    ));

    let mut no_technique = protocol.to_record();
    no_technique.technique = None;
    assert!(matches!(
        LayeringProtocol::new(no_technique),
        Err(ValidationError::MissingPillar {
            pillar: Pillar::Technique,
            ..
        })
    ));

    let mut no_cost = protocol.to_record();
    no_cost.cost_analysis = None;
    assert!(matches!(
        LayeringProtocol::new(no_cost),
        Err(ValidationError::MissingPillar {
            pillar: Pillar::CostAnalysis,
            ..
        })
    ));

    let mut unnamed = protocol.to_record();
    unnamed.name = "  ".to_string();
    assert!(matches!(
        LayeringProtocol::new(unnamed),
        Err(ValidationError::EmptyName(_))
    ));
}

#[test]
fn missing_pillar_is_reported_by_its_wire_field() {
    let catalog = fixture_catalog();
    let generator = generator_for(&catalog, 5);
    let items = catalog.fragrances().iter().collect::<Vec<_>>();
    let protocol = generator.generate(&items, 5, 0, Utc::now()).protocols[0].clone();

    for pillar in Pillar::ALL {
        let field = pillar.to_string();
        let mut value = protocol.to_json().unwrap();
        assert!(value.get(&field).is_some(), "{field} is not a record field");
        value.as_object_mut().unwrap().remove(&field);

        let err = LayeringProtocol::from_json(value).unwrap_err();
        assert!(
            err.to_string().contains(&format!("missing pillar `{field}`")),
            "{err}"
        );
    }
}
