mod common;

use common::{assert_close, fixture_service};
use sillage_core::model::fragrance::Family;
use sillage_core::{
    EngineConfig, LayeringService, ProtocolFilter, ServiceError, SortKey, SqliteKvStore, Tier,
};

fn builtin_service() -> LayeringService<SqliteKvStore> {
    LayeringService::with_builtin_catalog(
        SqliteKvStore::open_in_memory().unwrap(),
        EngineConfig::default(),
    )
    .unwrap()
}

#[test]
fn first_run_seeds_whole_catalog_and_paginates_five_hundred() {
    let mut service = builtin_service();
    let init = service.initialize(false).unwrap();
    assert!(init.is_first_run);
    assert_eq!(init.protocol_count, 500);
    assert_eq!(init.item_count, service.catalog().fragrances().len());

    let filter = ProtocolFilter::default();
    let first = service.paginate(1, 20, &filter).unwrap();
    assert_eq!(first.total, 500);
    assert_eq!(first.total_pages, 25);
    assert_eq!(first.data.len(), 20);

    let last = service.paginate(25, 20, &filter).unwrap();
    assert_eq!(last.data.len(), 20);

    let past_end = service.paginate(26, 20, &filter).unwrap();
    assert!(past_end.data.is_empty());
    assert_eq!(past_end.total, 500);

    let again = service.initialize(false).unwrap();
    assert!(!again.is_first_run);
    assert_eq!(again.protocol_count, 500);
}

#[test]
fn filters_combine_and_sorts_apply() {
    let mut service = builtin_service();
    service.initialize(false).unwrap();

    let by_savings = service
        .search(&ProtocolFilter {
            sort: Some(SortKey::Savings),
            ..ProtocolFilter::default()
        })
        .unwrap();
    assert!(by_savings
        .windows(2)
        .all(|pair| pair[0].cost_analysis().savings >= pair[1].cost_analysis().savings));

    let by_cost = service
        .search(&ProtocolFilter {
            sort: Some(SortKey::Cost),
            ..ProtocolFilter::default()
        })
        .unwrap();
    assert!(by_cost
        .windows(2)
        .all(|pair| pair[0].cost_analysis().real_cost <= pair[1].cost_analysis().real_cost));

    let item_id = service.catalog().fragrances()[0].id.clone();
    let narrowed = service
        .search(&ProtocolFilter {
            tier: Some(Tier::Beta),
            fragrance_id: Some(item_id.clone()),
            min_savings: Some(100.0),
            ..ProtocolFilter::default()
        })
        .unwrap();
    assert!(narrowed.iter().all(|protocol| {
        protocol.compatibility().tier == Tier::Beta
            && protocol.uses_item(&item_id)
            && protocol.cost_analysis().savings >= 100.0
    }));

    let text = service
        .search(&ProtocolFilter {
            text: Some("PROTOCOL".to_string()),
            ..ProtocolFilter::default()
        })
        .unwrap();
    assert!(!text.is_empty());
    assert!(text
        .iter()
        .all(|protocol| protocol.name().to_lowercase().contains("protocol")
            || protocol.description().to_lowercase().contains("protocol")
            || protocol.category().to_lowercase().contains("protocol")));
}

#[test]
fn favorites_toggle_and_filter() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();
    let id = service.paginate(1, 1, &ProtocolFilter::default()).unwrap().data[0]
        .id()
        .to_string();

    assert!(service.toggle_favorite(&id).unwrap());
    assert!(service.is_favorite(&id).unwrap());
    assert_eq!(service.favorites().unwrap(), vec![id.clone()]);

    let favorites_only = service
        .search(&ProtocolFilter {
            favorites_only: true,
            ..ProtocolFilter::default()
        })
        .unwrap();
    assert_eq!(favorites_only.len(), 1);
    assert!(favorites_only[0].is_favorite());
    assert_eq!(service.favorite_protocols().unwrap().len(), 1);

    assert!(!service.toggle_favorite(&id).unwrap());
    assert!(service.favorites().unwrap().is_empty());

    let err = service.toggle_favorite("LP-9999").unwrap_err();
    assert!(matches!(err, ServiceError::ProtocolNotFound(id) if id == "LP-9999"));
}

#[test]
fn usage_registration_feeds_the_ledger_and_summary() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();
    let protocol = service.paginate(1, 1, &ProtocolFilter::default()).unwrap().data[0].clone();
    let saving = protocol.cost_analysis().savings;

    let first = service.register_usage(protocol.id()).unwrap();
    assert_close(first.saving, saving, 1e-9);
    assert_close(first.total_saved, saving, 1e-9);

    let second = service.register_usage(protocol.id()).unwrap();
    assert_close(second.total_saved, saving * 2.0, 1e-3);

    let updated = service.get_by_id(protocol.id()).unwrap().unwrap();
    assert_eq!(updated.times_used(), 2);

    let summary = service.savings_summary().unwrap();
    assert_eq!(summary.uses, 2);
    assert_close(summary.total_saved, second.total_saved, 1e-9);
    assert_eq!(service.usage_history().unwrap().len(), 2);

    let report = service.financial_report().unwrap();
    assert_eq!(report.summary.uses, 2);
    assert!(!report.top_protocols.is_empty());

    let stats = service.stats().unwrap();
    assert_eq!(stats.uses, 2);
    assert_eq!(stats.item_count, 6);
    assert_eq!(
        stats.protocols.alpha + stats.protocols.beta + stats.protocols.gamma + stats.protocols.delta,
        stats.protocols.active
    );
    assert!(stats.storage.total_bytes > 0);

    let err = service.register_usage("LP-9999").unwrap_err();
    assert!(matches!(err, ServiceError::ProtocolNotFound(_)));
}

#[test]
fn reset_regenerates_and_clears_user_state() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();
    let id = service.paginate(1, 1, &ProtocolFilter::default()).unwrap().data[0]
        .id()
        .to_string();
    service.toggle_favorite(&id).unwrap();
    service.register_usage(&id).unwrap();
    service.remove_item("A-001").unwrap();

    let reset = service.reset_all().unwrap();
    assert!(reset.is_first_run);
    assert_eq!(reset.item_count, 6);
    assert!(service.favorites().unwrap().is_empty());
    assert!(service.usage_history().unwrap().is_empty());
    assert_eq!(service.savings_summary().unwrap().uses, 0);
}

#[test]
fn inventory_summary_groups_and_ranks_owned_items() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();
    let owned = service.owned_items().unwrap();

    let summary = service.inventory_summary().unwrap();
    assert_eq!(summary.total_items, 6);
    assert_eq!(summary.catalog_size, 6);
    assert_eq!(summary.catalog_coverage_percent, 100);
    assert_close(summary.retail_value, 535.0, 1e-9);
    assert_close(summary.average_cost_per_application, 0.089, 1e-9);
    let dominant = summary.dominant_family.unwrap();
    assert_eq!((dominant.family, dominant.count), (Family::Woody, 3));
    assert_eq!(summary.dominant_house.unwrap().house, "A-001 house");
    assert_close(
        summary.fiscal_value,
        owned.iter().map(|entry| entry.potential_savings).sum(),
        0.01,
    );

    let by_family = service.inventory_by_family().unwrap();
    let families = by_family.iter().map(|group| group.family).collect::<Vec<_>>();
    assert_eq!(
        families,
        vec![Family::Woody, Family::Oriental, Family::Aquatic, Family::Gourmand]
    );
    let woody = by_family[0]
        .items
        .iter()
        .map(|entry| entry.item.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(woody, vec!["A-001", "B-001", "F-001"]);
    assert_eq!(service.inventory_by_house().unwrap().len(), 6);

    let top = service.top_value_items(3).unwrap();
    assert_eq!(top.len(), 3);
    assert!(top
        .windows(2)
        .all(|pair| pair[0].potential_savings >= pair[1].potential_savings));

    let unused = service.unused_items().unwrap();
    let expected_unused = owned
        .iter()
        .filter(|entry| entry.active_protocols == 0)
        .map(|entry| entry.item.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        unused.iter().map(|entry| entry.item.id.clone()).collect::<Vec<_>>(),
        expected_unused
    );

    assert!(service.purchase_suggestions(5).unwrap().is_empty());
}

#[test]
fn batch_add_skips_unknown_owned_and_repeated_ids() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();
    service.remove_item("C-001").unwrap();
    service.remove_item("E-001").unwrap();

    let batch = service
        .add_items(&["C-001", "X-999", "C-001", "A-001", "E-001"])
        .unwrap();
    assert_eq!(batch.added, vec!["C-001", "E-001"]);
    assert_eq!(batch.skipped, vec!["X-999", "C-001", "A-001"]);
    assert_eq!(
        service.inventory().unwrap(),
        vec!["A-001", "B-001", "D-001", "F-001", "C-001", "E-001"]
    );
    assert_eq!(service.store().load_inventory().unwrap().len(), 6);

    let nothing = service.add_items(&["A-001"]).unwrap();
    assert!(nothing.added.is_empty());
    assert_eq!(nothing.generated, 0);
}

#[test]
fn purchase_suggestions_favor_missing_families() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();
    for id in ["C-001", "D-001", "E-001"] {
        service.remove_item(id).unwrap();
    }

    // Gourmand EDP at 0.07 scores 85, oriental EDP at 0.12 scores 75,
    // aquatic EDT at 0.06 scores 70.
    let suggestions = service.purchase_suggestions(5).unwrap();
    let ranked = suggestions
        .iter()
        .map(|suggestion| (suggestion.item.id.as_str(), suggestion.score))
        .collect::<Vec<_>>();
    assert_eq!(ranked, vec![("E-001", 85), ("C-001", 75), ("D-001", 70)]);
    assert!(suggestions[0].reason.contains("is not represented"));
    assert!(suggestions.iter().all(|suggestion| suggestion.unlocked_pairs <= 3));

    assert_eq!(service.purchase_suggestions(2).unwrap().len(), 2);
}

#[test]
fn ranked_protocols_and_detail_view() {
    let mut service = fixture_service(8);
    service.initialize(false).unwrap();

    let recommended = service.recommended_protocols(3).unwrap();
    assert!(!recommended.is_empty() && recommended.len() <= 3);
    assert!(recommended.iter().all(|protocol| protocol.is_active()));
    assert!(recommended
        .windows(2)
        .all(|pair| pair[0].compatibility().score >= pair[1].compatibility().score));

    let profitable = service.most_profitable_protocols(3).unwrap();
    let by_savings = service
        .search(&ProtocolFilter {
            sort: Some(SortKey::Savings),
            ..ProtocolFilter::default()
        })
        .unwrap();
    assert_eq!(profitable.as_slice(), &by_savings[..profitable.len()]);

    let id = recommended[0].id().to_string();
    let detail = service.protocol_detail(&id).unwrap().unwrap();
    assert_eq!(detail.protocol.id(), id);
    assert_eq!(detail.items.len(), detail.protocol.assets().len());
    assert!(detail
        .items
        .iter()
        .all(|item| detail.protocol.uses_item(&item.id)));
    assert_eq!(
        detail.reference.map(|reference| reference.id),
        Some(detail.protocol.cost_analysis().reference_id.clone())
    );
    assert!(!detail.is_favorite);

    service.toggle_favorite(&id).unwrap();
    assert!(service.protocol_detail(&id).unwrap().unwrap().is_favorite);
    assert!(service.protocol_detail("LP-9999").unwrap().is_none());
}
