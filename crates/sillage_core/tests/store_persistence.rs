mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{fixture_catalog, fixture_config};
use sillage_core::engine::generator::ProtocolGenerator;
use sillage_core::store::{ExportDocument, KeyValueStore, ProtocolStore, StoreError};
use sillage_core::{
    LayeringProtocol, LayeringService, ProtocolFilter, SavingsSummary, SqliteKvStore,
    StoreConfig, UsageRecord, EXPORT_FORMAT_VERSION,
};

fn sample_protocols(count: usize) -> Vec<LayeringProtocol> {
    let catalog = fixture_catalog();
    let generator = ProtocolGenerator::new(
        catalog.clone(),
        fixture_config(count).generator,
        Default::default(),
    );
    let items = catalog.fragrances().iter().collect::<Vec<_>>();
    let protocols = generator.generate(&items, count, 0, Utc::now()).protocols;
    assert_eq!(protocols.len(), count);
    protocols
}

fn small_chunk_store() -> ProtocolStore<SqliteKvStore> {
    ProtocolStore::new(
        SqliteKvStore::open_in_memory().unwrap(),
        StoreConfig {
            chunk_size: 2,
            ..StoreConfig::default()
        },
    )
}

#[test]
fn protocols_are_chunked_and_reloaded_in_order() {
    let store = small_chunk_store();
    let protocols = sample_protocols(5);
    store.save_protocols(&protocols).unwrap();

    let keys = store.kv().get_all_keys().unwrap();
    for chunk in 0..3 {
        assert!(keys.contains(&format!("@sillage/v1/protocols_chunk_{chunk}")));
    }
    let index: serde_json::Value = serde_json::from_str(
        &store
            .kv()
            .get_item("@sillage/v1/protocols_index")
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(index["total_chunks"], 3);
    assert_eq!(index["total_protocols"], 5);

    let load = store.load_protocols().unwrap();
    assert_eq!(load.protocols, protocols);
    assert_eq!(load.skipped_chunks, 0);

    store.save_protocols(&protocols[..1]).unwrap();
    let keys = store.kv().get_all_keys().unwrap();
    assert!(keys.contains(&"@sillage/v1/protocols_chunk_0".to_string()));
    assert!(!keys.contains(&"@sillage/v1/protocols_chunk_1".to_string()));
    assert!(!keys.contains(&"@sillage/v1/protocols_chunk_2".to_string()));
    assert_eq!(store.load_protocols().unwrap().protocols.len(), 1);
}

#[test]
fn corrupt_chunk_is_skipped_and_load_continues() {
    let store = small_chunk_store();
    let protocols = sample_protocols(5);
    store.save_protocols(&protocols).unwrap();
    store
        .kv()
        .set_item("@sillage/v1/protocols_chunk_1", "{{ not json")
        .unwrap();

    let load = store.load_protocols().unwrap();
    assert_eq!(load.skipped_chunks, 1);
    let ids = load
        .protocols
        .iter()
        .map(LayeringProtocol::id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![protocols[0].id(), protocols[1].id(), protocols[4].id()]);
}

#[test]
fn corrupt_record_is_skipped_within_its_chunk() {
    let store = small_chunk_store();
    let protocols = sample_protocols(4);
    store.save_protocols(&protocols).unwrap();

    let mut broken = protocols[3].to_json().unwrap();
    broken["assets"] = serde_json::json!(["A-001"]);
    let chunk = serde_json::json!([protocols[2].to_json().unwrap(), broken]).to_string();
    store
        .kv()
        .set_item("@sillage/v1/protocols_chunk_1", &chunk)
        .unwrap();

    let load = store.load_protocols().unwrap();
    assert_eq!(load.skipped_records, 1);
    assert_eq!(load.protocols.len(), 3);
    assert_eq!(load.protocols[2], protocols[2]);
}

#[test]
fn import_without_version_leaves_state_untouched() {
    let store = small_chunk_store();
    let protocols = sample_protocols(3);
    store.save_protocols(&protocols).unwrap();
    store.save_inventory(&["A-001".to_string()]).unwrap();
    let before = store.export_all(Utc::now()).unwrap();

    let mut document = before.clone();
    document.version = None;
    document.inventory = vec!["B-001".to_string()];
    let err = store.import_all(&document, Utc::now()).unwrap_err();
    assert!(matches!(err, StoreError::ImportFormat(_)));

    let after = store.export_all(before.export_date.unwrap()).unwrap();
    assert_eq!(after, before);
}

#[test]
fn import_with_invalid_protocol_writes_nothing() {
    let store = small_chunk_store();
    store.save_inventory(&["A-001".to_string()]).unwrap();

    let mut bad = sample_protocols(1)[0].to_json().unwrap();
    bad["compatibility"] = serde_json::Value::Null;
    let document = ExportDocument {
        version: Some(EXPORT_FORMAT_VERSION.to_string()),
        protocols: vec![bad],
        inventory: vec!["B-001".to_string()],
        ..ExportDocument::default()
    };

    let err = store.import_all(&document, Utc::now()).unwrap_err();
    assert!(matches!(err, StoreError::ImportFormat(message) if message.contains("#0")));
    assert_eq!(store.load_inventory().unwrap(), vec!["A-001".to_string()]);
    assert!(store.load_protocols().unwrap().protocols.is_empty());
}

#[test]
fn export_then_import_restores_a_fresh_store() {
    let source = small_chunk_store();
    let protocols = sample_protocols(5);
    source.save_protocols(&protocols).unwrap();
    source
        .save_inventory(&["A-001".to_string(), "B-001".to_string()])
        .unwrap();
    source.save_favorites(&[protocols[1].id().to_string()]).unwrap();

    let wire = serde_json::to_string(&source.export_all(Utc::now()).unwrap()).unwrap();
    let document: ExportDocument = serde_json::from_str(&wire).unwrap();
    assert_eq!(document.version.as_deref(), Some(EXPORT_FORMAT_VERSION));

    let target = small_chunk_store();
    target.import_all(&document, Utc::now()).unwrap();
    assert_eq!(target.load_protocols().unwrap().protocols, protocols);
    assert_eq!(target.load_inventory().unwrap().len(), 2);
    assert_eq!(target.load_favorites().unwrap(), vec![protocols[1].id().to_string()]);

    let metadata = target.load_metadata().unwrap().unwrap();
    assert_eq!(metadata.imported_from.as_deref(), Some(EXPORT_FORMAT_VERSION));
    assert_eq!(metadata.protocol_count, 5);
}

#[test]
fn storage_usage_groups_protocol_chunks() {
    let store = small_chunk_store();
    store.save_protocols(&sample_protocols(5)).unwrap();
    store.save_inventory(&["A-001".to_string()]).unwrap();

    let usage = store.storage_usage().unwrap();
    assert_eq!(usage.breakdown.len(), 2);
    let grouped: usize = usage.breakdown.values().sum();
    assert_eq!(grouped, usage.total_bytes);
    assert!(usage.breakdown["@sillage/v1/protocols"] > usage.breakdown["@sillage/v1/inventory"]);
}

#[test]
fn session_state_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sillage.db");

    let (favorite_id, count) = {
        let mut service = LayeringService::new(
            fixture_catalog(),
            SqliteKvStore::open(&path).unwrap(),
            fixture_config(8),
        );
        let init = service.initialize(false).unwrap();
        assert!(init.is_first_run);
        let id = service.paginate(1, 1, &ProtocolFilter::default()).unwrap().data[0]
            .id()
            .to_string();
        service.toggle_favorite(&id).unwrap();
        service.register_usage(&id).unwrap();
        (id, init.protocol_count)
    };

    let mut reopened = LayeringService::new(
        fixture_catalog(),
        SqliteKvStore::open(&path).unwrap(),
        fixture_config(8),
    );
    let init = reopened.initialize(false).unwrap();
    assert!(!init.is_first_run);
    assert_eq!(init.protocol_count, count);
    assert!(reopened.is_favorite(&favorite_id).unwrap());

    let protocol = reopened.get_by_id(&favorite_id).unwrap().unwrap();
    assert!(protocol.is_favorite());
    assert_eq!(protocol.times_used(), 1);
    assert_eq!(reopened.usage_history().unwrap().len(), 1);
}

#[test]
fn service_import_rejects_unversioned_document() {
    let mut service = LayeringService::new(
        fixture_catalog(),
        SqliteKvStore::open_in_memory().unwrap(),
        fixture_config(8),
    );
    service.initialize(false).unwrap();
    let mut document = service.export_all().unwrap();
    let protocols = document.protocols.len();
    document.version = None;
    document.protocols.clear();

    assert!(service.import_all(&document).is_err());
    let all = ProtocolFilter {
        active_only: false,
        ..ProtocolFilter::default()
    };
    assert_eq!(service.search(&all).unwrap().len(), protocols);
}

fn usage_at(protocol_id: &str, day: i64, saving: f64, cost: f64) -> UsageRecord {
    UsageRecord {
        protocol_id: protocol_id.to_string(),
        used_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::days(day),
        saving,
        cost,
    }
}

#[test]
fn import_rebuilds_savings_summary_from_history() {
    let store = small_chunk_store();
    let document = ExportDocument {
        version: Some(EXPORT_FORMAT_VERSION.to_string()),
        protocols: sample_protocols(3)
            .iter()
            .map(|protocol| protocol.to_json().unwrap())
            .collect(),
        usage_history: vec![
            usage_at("LP-0001", 0, 100.0, 0.5),
            usage_at("LP-0002", 1, 50.0, 0.25),
            usage_at("LP-0001", 2, 100.0, 0.5),
        ],
        savings_summary: Some(SavingsSummary::default()),
        ..ExportDocument::default()
    };

    store.import_all(&document, Utc::now()).unwrap();
    let summary = store.load_savings_summary().unwrap().unwrap();
    assert_eq!(summary.uses, 3);
    assert_eq!(summary.total_saved, 250.0);
    assert_eq!(summary.total_spent, 1.25);
    assert_eq!(
        summary
            .history
            .iter()
            .map(|entry| entry.protocol_id.as_str())
            .collect::<Vec<_>>(),
        vec!["LP-0001", "LP-0002", "LP-0001"]
    );
}

#[test]
fn service_summary_follows_the_ledger_after_import() {
    let mut service = LayeringService::new(
        fixture_catalog(),
        SqliteKvStore::open_in_memory().unwrap(),
        fixture_config(8),
    );
    service.initialize(false).unwrap();
    let mut document = service.export_all().unwrap();
    let id = document.protocols[0]["id"].as_str().unwrap().to_string();
    document.usage_history = vec![usage_at(&id, 0, 80.0, 0.4), usage_at(&id, 4, 80.0, 0.4)];
    document.savings_summary = Some(SavingsSummary::default());

    service.import_all(&document).unwrap();
    let summary = service.savings_summary().unwrap();
    assert_eq!(summary.uses, 2);
    assert_eq!(summary.total_saved, 160.0);
    assert_eq!(summary.history.len(), 2);

    service
        .store()
        .save_savings_summary(&SavingsSummary::default())
        .unwrap();
    assert_eq!(service.savings_summary().unwrap(), summary);
    assert_eq!(service.store().load_savings_summary().unwrap(), Some(summary));
}

#[test]
fn chunks_orphaned_by_a_corrupt_index_are_removed_on_next_save() {
    let store = small_chunk_store();
    let protocols = sample_protocols(5);
    store.save_protocols(&protocols).unwrap();
    store
        .kv()
        .set_item("@sillage/v1/protocols_index", "garbage")
        .unwrap();
    assert!(store.load_protocols().unwrap().protocols.is_empty());

    store.save_protocols(&protocols[..1]).unwrap();
    let chunks = store
        .kv()
        .get_all_keys()
        .unwrap()
        .into_iter()
        .filter(|key| key.contains("_chunk_"))
        .collect::<Vec<_>>();
    assert_eq!(chunks, vec!["@sillage/v1/protocols_chunk_0"]);
    assert_eq!(store.load_protocols().unwrap().protocols, protocols[..1]);
}
