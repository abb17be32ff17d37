//! Incremental resynchronization of protocols with the owned inventory.
//!
//! # Responsibility
//! - Deactivate protocols that reference an item no longer owned.
//! - Top the valid set back up to the target with freshly generated protocols.
//!
//! # Invariants
//! - Existing protocols keep their position and data; only the active flag
//!   and deactivation reason of orphaned ones change.
//! - A protocol already inactive stays inactive, even if its items return.
//! - No two active protocols share an asset set after a pass.
//! - New ids continue after the highest existing `LP-` sequence.

use super::generator::ProtocolGenerator;
use crate::catalog::Catalog;
use crate::model::protocol::{protocol_sequence, LayeringProtocol};
use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashSet;

/// Reason recorded on protocols orphaned by an inventory change.
pub const ORPHANED_REASON: &str = "Fragrance(s) removed from inventory";

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Merged set to persist: existing protocols in order, then new ones.
    pub protocols: Vec<LayeringProtocol>,
    /// Active protocols whose items are all still owned.
    pub still_valid: usize,
    /// Protocols deactivated by this pass.
    pub orphaned: usize,
    pub generated: usize,
}

/// Reconciles `existing` with the owned item ids.
///
/// `owned_ids` order decides enumeration order for new combinations; ids
/// unknown to the catalog are ignored.
pub fn synchronize_with_inventory(
    generator: &ProtocolGenerator,
    catalog: &Catalog,
    existing: Vec<LayeringProtocol>,
    owned_ids: &[String],
    now: DateTime<Utc>,
) -> SyncOutcome {
    let owned = owned_ids.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut protocols = existing;
    let mut still_valid = 0;
    let mut orphaned = 0;
    let mut valid_keys = HashSet::new();

    for protocol in &mut protocols {
        if !protocol.is_active() {
            continue;
        }
        if protocol.assets().iter().all(|id| owned.contains(id.as_str())) {
            still_valid += 1;
            valid_keys.insert(protocol.asset_key());
        } else {
            protocol.deactivate(ORPHANED_REASON);
            orphaned += 1;
        }
    }

    let target = generator.config().target_protocols;
    let shortfall = target.saturating_sub(still_valid);
    let items = owned_ids
        .iter()
        .filter_map(|id| catalog.fragrance(id))
        .filter(|item| item.active)
        .collect::<Vec<_>>();

    let mut generated = 0;
    if shortfall > 0 && items.len() >= 2 {
        let id_offset = protocols
            .iter()
            .filter_map(|protocol| protocol_sequence(protocol.id()))
            .max()
            .unwrap_or(0);
        let fresh = generator.generate(&items, shortfall, id_offset, now);
        for protocol in fresh.protocols {
            if valid_keys.insert(protocol.asset_key()) {
                protocols.push(protocol);
                generated += 1;
            }
        }
    }

    info!(
        "event=protocol_sync module=sync status=ok owned={} valid={} orphaned={} generated={} total={}",
        owned_ids.len(),
        still_valid,
        orphaned,
        generated,
        protocols.len()
    );

    SyncOutcome {
        protocols,
        still_valid,
        orphaned,
        generated,
    }
}
