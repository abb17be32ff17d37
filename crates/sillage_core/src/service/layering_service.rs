//! Layering session service.
//!
//! # Responsibility
//! - Expose the engine's use cases (inventory, queries, favorites, usage,
//!   reports, backup) over one explicit session object.
//! - Keep an in-memory mirror of protocols, inventory and favorites.
//!
//! # Invariants
//! - The cache loads lazily on first access.
//! - A mutation persists first and only then installs its result in the
//!   cache; a failed mutation leaves the cache invalidated.
//! - The favorites list is authoritative; protocol favorite flags in the
//!   cache are derived from it.
//! - Callers serialize mutations; the session holds no internal lock.

use crate::catalog::{Catalog, CatalogError};
use crate::config::EngineConfig;
use crate::engine::fiscal::{self, QuickSavings, SprayApplication};
use crate::engine::generator::ProtocolGenerator;
use crate::engine::search::{self, Page, ProtocolFilter, SortKey};
use crate::engine::sync::synchronize_with_inventory;
use crate::model::fragrance::{FragranceItem, ReferenceItem};
use crate::model::protocol::{LayeringProtocol, Tier};
use crate::model::round_to;
use crate::model::savings::{FinancialReport, SavingsSummary, UsageRecord};
use crate::store::{
    ExportDocument, KeyValueStore, ProtocolStore, StorageMetadata, StorageUsage, StoreError,
    EXPORT_FORMAT_VERSION,
};
use super::inventory_insights::{
    self, FamilyGroup, HouseGroup, InventorySummary, PurchaseSuggestion,
};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("protocol `{0}` not found")]
    ProtocolNotFound(String),
}

/// Outcome of [`LayeringService::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitSummary {
    pub protocol_count: usize,
    pub item_count: usize,
    pub is_first_run: bool,
}

/// Outcome of adding or removing an owned item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryChange {
    pub success: bool,
    /// Protocols deactivated by the change.
    pub affected: usize,
    /// Protocols generated to refill the set.
    pub generated: usize,
    pub message: String,
}

impl InventoryChange {
    fn rejected(message: String) -> Self {
        Self {
            success: false,
            affected: 0,
            generated: 0,
            message,
        }
    }
}

/// Outcome of adding several owned items with a single resynchronization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchAddition {
    pub added: Vec<String>,
    /// Unknown, already owned or repeated ids.
    pub skipped: Vec<String>,
    pub generated: usize,
}

/// A protocol with the catalog records it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDetail {
    pub protocol: LayeringProtocol,
    pub items: Vec<FragranceItem>,
    pub reference: Option<ReferenceItem>,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageReceipt {
    pub saving: f64,
    pub total_saved: f64,
}

/// Owned item with the protocols that currently rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedItem {
    pub item: FragranceItem,
    pub active_protocols: usize,
    pub potential_savings: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolCounts {
    pub total: usize,
    pub active: usize,
    pub alpha: usize,
    pub beta: usize,
    pub gamma: usize,
    pub delta: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub protocols: ProtocolCounts,
    pub item_count: usize,
    pub collection_value: f64,
    pub favorites: usize,
    pub uses: usize,
    /// Summed savings of active protocols, rounded to 2 decimals.
    pub max_potential_savings: f64,
    /// Mean compatibility of active protocols, rounded to 1 decimal.
    pub mean_compatibility: f64,
    pub storage: StorageUsage,
}

#[derive(Debug, Clone, Default)]
struct SessionCache {
    protocols: Vec<LayeringProtocol>,
    inventory: Vec<String>,
    favorites: Vec<String>,
}

impl SessionCache {
    fn load<S: KeyValueStore>(store: &ProtocolStore<S>) -> ServiceResult<Self> {
        let mut cache = SessionCache {
            protocols: store.load_protocols()?.protocols,
            inventory: store.load_inventory()?,
            favorites: store.load_favorites()?,
        };
        cache.apply_favorites();
        Ok(cache)
    }

    fn apply_favorites(&mut self) {
        for protocol in &mut self.protocols {
            let favorite = self.favorites.iter().any(|id| id == protocol.id());
            protocol.set_favorite(favorite);
        }
    }

    fn protocol(&self, id: &str) -> Option<&LayeringProtocol> {
        self.protocols.iter().find(|protocol| protocol.id() == id)
    }

    fn active(&self) -> impl Iterator<Item = &LayeringProtocol> {
        self.protocols.iter().filter(|protocol| protocol.is_active())
    }
}

/// One engine session over a key-value backend.
pub struct LayeringService<S> {
    catalog: Catalog,
    generator: ProtocolGenerator,
    store: ProtocolStore<S>,
    cache: Option<SessionCache>,
}

impl<S: KeyValueStore> LayeringService<S> {
    pub fn new(catalog: Catalog, kv: S, config: EngineConfig) -> Self {
        let generator = ProtocolGenerator::new(catalog.clone(), config.generator, config.ranking);
        Self {
            catalog,
            generator,
            store: ProtocolStore::new(kv, config.store),
            cache: None,
        }
    }

    /// Session over the catalog compiled into the binary.
    pub fn with_builtin_catalog(kv: S, config: EngineConfig) -> ServiceResult<Self> {
        Ok(Self::new(Catalog::builtin()?, kv, config))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &ProtocolStore<S> {
        &self.store
    }

    fn cache(&mut self) -> ServiceResult<&SessionCache> {
        if self.cache.is_none() {
            self.cache = Some(SessionCache::load(&self.store)?);
        }
        Ok(&*self.cache.get_or_insert_with(SessionCache::default))
    }

    /// Moves the cache out for a read-modify-write. The caller reinstalls it
    /// only after persistence succeeded.
    fn take_cache(&mut self) -> ServiceResult<SessionCache> {
        match self.cache.take() {
            Some(cache) => Ok(cache),
            None => SessionCache::load(&self.store),
        }
    }

    fn invalidate(&mut self) {
        self.cache = None;
    }

    // ── Lifecycle ───────────────────────────────────────

    /// Loads persisted state, or seeds it on first run.
    ///
    /// A first run (no metadata yet, or `force_regenerate`) takes the whole
    /// catalog as inventory, generates the protocol set and clears favorites.
    pub fn initialize(&mut self, force_regenerate: bool) -> ServiceResult<InitSummary> {
        let started_at = Instant::now();
        let is_first_run = force_regenerate || self.store.load_metadata()?.is_none();

        if !is_first_run {
            self.invalidate();
            let cache = self.cache()?;
            let summary = InitSummary {
                protocol_count: cache.protocols.len(),
                item_count: cache.inventory.len(),
                is_first_run,
            };
            info!(
                "event=session_init module=service status=ok first_run=false protocols={} items={}",
                summary.protocol_count, summary.item_count
            );
            return Ok(summary);
        }

        self.invalidate();
        let now = Utc::now();
        let inventory = self
            .catalog
            .fragrances()
            .iter()
            .map(|item| item.id.clone())
            .collect::<Vec<_>>();
        let items = self.catalog.fragrances().iter().collect::<Vec<_>>();
        let target = self.generator.config().target_protocols;
        let generation = self.generator.generate(&items, target, 0, now);

        self.store.save_protocols(&generation.protocols)?;
        self.store.save_inventory(&inventory)?;
        self.store.save_favorites(&[])?;
        self.store.save_metadata(
            &StorageMetadata {
                format_version: EXPORT_FORMAT_VERSION.to_string(),
                generated_at: Some(now),
                protocol_count: generation.protocols.len(),
                item_count: inventory.len(),
                ..StorageMetadata::default()
            },
            now,
        )?;

        let summary = InitSummary {
            protocol_count: generation.protocols.len(),
            item_count: inventory.len(),
            is_first_run,
        };
        self.cache = Some(SessionCache {
            protocols: generation.protocols,
            inventory,
            favorites: Vec::new(),
        });

        info!(
            "event=session_init module=service status=ok first_run=true protocols={} items={} duration_ms={}",
            summary.protocol_count,
            summary.item_count,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    // ── Inventory ───────────────────────────────────────

    pub fn add_item(&mut self, fragrance_id: &str) -> ServiceResult<InventoryChange> {
        if !self.catalog.contains_fragrance(fragrance_id) {
            warn!("event=inventory_add module=service status=skip error_code=unknown_item id={fragrance_id}");
            return Ok(InventoryChange::rejected(format!(
                "Fragrance `{fragrance_id}` is not in the catalog"
            )));
        }
        if self.cache()?.inventory.iter().any(|id| id == fragrance_id) {
            return Ok(InventoryChange::rejected(format!(
                "Fragrance `{fragrance_id}` is already in the inventory"
            )));
        }

        let mut cache = self.take_cache()?;
        cache.inventory.push(fragrance_id.to_string());
        let change = self.resynchronize(cache)?;
        info!(
            "event=inventory_add module=service status=ok id={fragrance_id} generated={}",
            change.generated
        );
        Ok(InventoryChange {
            message: format!(
                "Added `{fragrance_id}`; {} new protocol(s) generated",
                change.generated
            ),
            ..change
        })
    }

    pub fn remove_item(&mut self, fragrance_id: &str) -> ServiceResult<InventoryChange> {
        let Some(position) = self
            .cache()?
            .inventory
            .iter()
            .position(|id| id == fragrance_id)
        else {
            return Ok(InventoryChange::rejected(format!(
                "Fragrance `{fragrance_id}` is not in the inventory"
            )));
        };

        let mut cache = self.take_cache()?;
        cache.inventory.remove(position);
        let change = self.resynchronize(cache)?;
        info!(
            "event=inventory_remove module=service status=ok id={fragrance_id} deactivated={} generated={}",
            change.affected, change.generated
        );
        Ok(InventoryChange {
            message: format!(
                "Removed `{fragrance_id}`; {} protocol(s) deactivated",
                change.affected
            ),
            ..change
        })
    }

    /// Adds every new catalog id in order, then resynchronizes once.
    pub fn add_items<I: AsRef<str>>(
        &mut self,
        fragrance_ids: &[I],
    ) -> ServiceResult<BatchAddition> {
        let owned = self.cache()?.inventory.clone();
        let mut batch = BatchAddition::default();
        for id in fragrance_ids.iter().map(AsRef::as_ref) {
            let fresh = self.catalog.contains_fragrance(id)
                && !owned.iter().any(|existing| existing == id)
                && !batch.added.iter().any(|added| added == id);
            if !fresh {
                batch.skipped.push(id.to_string());
            } else {
                batch.added.push(id.to_string());
            }
        }
        if batch.added.is_empty() {
            info!(
                "event=inventory_add_many module=service status=skip added=0 skipped={}",
                batch.skipped.len()
            );
            return Ok(batch);
        }

        let mut cache = self.take_cache()?;
        cache.inventory.extend(batch.added.iter().cloned());
        batch.generated = self.resynchronize(cache)?.generated;
        info!(
            "event=inventory_add_many module=service status=ok added={} skipped={} generated={}",
            batch.added.len(),
            batch.skipped.len(),
            batch.generated
        );
        Ok(batch)
    }

    fn resynchronize(&mut self, mut cache: SessionCache) -> ServiceResult<InventoryChange> {
        let now = Utc::now();
        let outcome = synchronize_with_inventory(
            &self.generator,
            &self.catalog,
            std::mem::take(&mut cache.protocols),
            &cache.inventory,
            now,
        );
        cache.protocols = outcome.protocols;
        cache.apply_favorites();

        let previous = self.store.load_metadata()?.unwrap_or_default();
        let metadata = StorageMetadata {
            format_version: EXPORT_FORMAT_VERSION.to_string(),
            last_sync_at: Some(now),
            protocol_count: cache.protocols.len(),
            item_count: cache.inventory.len(),
            deactivated_count: cache
                .protocols
                .iter()
                .filter(|protocol| !protocol.is_active())
                .count(),
            ..previous
        };
        self.store.save_inventory(&cache.inventory)?;
        self.store.save_protocols(&cache.protocols)?;
        self.store.save_metadata(&metadata, now)?;
        self.cache = Some(cache);

        Ok(InventoryChange {
            success: true,
            affected: outcome.orphaned,
            generated: outcome.generated,
            message: String::new(),
        })
    }

    /// Owned items with the count and summed savings of the active protocols using each.
    pub fn owned_items(&mut self) -> ServiceResult<Vec<OwnedItem>> {
        let catalog = self.catalog.clone();
        let cache = self.cache()?;
        Ok(cache
            .inventory
            .iter()
            .filter_map(|id| catalog.fragrance(id))
            .map(|item| {
                let using = cache
                    .active()
                    .filter(|protocol| protocol.uses_item(&item.id))
                    .collect::<Vec<_>>();
                OwnedItem {
                    item: item.clone(),
                    active_protocols: using.len(),
                    potential_savings: round_to(
                        using
                            .iter()
                            .map(|protocol| protocol.cost_analysis().savings)
                            .sum(),
                        2,
                    ),
                }
            })
            .collect())
    }

    /// Catalog items not yet owned, in catalog order.
    pub fn available_items(&mut self) -> ServiceResult<Vec<FragranceItem>> {
        let catalog = self.catalog.clone();
        let cache = self.cache()?;
        Ok(catalog
            .fragrances()
            .iter()
            .filter(|item| !cache.inventory.contains(&item.id))
            .cloned()
            .collect())
    }

    pub fn inventory(&mut self) -> ServiceResult<Vec<String>> {
        Ok(self.cache()?.inventory.clone())
    }

    pub fn inventory_by_family(&mut self) -> ServiceResult<Vec<FamilyGroup>> {
        Ok(inventory_insights::group_by_family(&self.owned_items()?))
    }

    pub fn inventory_by_house(&mut self) -> ServiceResult<Vec<HouseGroup>> {
        Ok(inventory_insights::group_by_house(&self.owned_items()?))
    }

    pub fn top_value_items(&mut self, limit: usize) -> ServiceResult<Vec<OwnedItem>> {
        Ok(inventory_insights::top_value(&self.owned_items()?, limit))
    }

    pub fn unused_items(&mut self) -> ServiceResult<Vec<OwnedItem>> {
        Ok(inventory_insights::unused(&self.owned_items()?))
    }

    pub fn inventory_summary(&mut self) -> ServiceResult<InventorySummary> {
        let owned = self.owned_items()?;
        Ok(inventory_insights::summarize_inventory(
            &owned,
            self.catalog.fragrances().len(),
        ))
    }

    pub fn purchase_suggestions(
        &mut self,
        limit: usize,
    ) -> ServiceResult<Vec<PurchaseSuggestion>> {
        let inventory = self.cache()?.inventory.clone();
        Ok(inventory_insights::suggest_purchases(
            &self.catalog,
            &inventory,
            self.generator.config().min_compatibility,
            limit,
        ))
    }

    // ── Queries ─────────────────────────────────────────

    pub fn search(&mut self, filter: &ProtocolFilter) -> ServiceResult<Vec<LayeringProtocol>> {
        let cache = self.cache()?;
        Ok(search::search(&cache.protocols, filter)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn paginate(
        &mut self,
        page: usize,
        page_size: usize,
        filter: &ProtocolFilter,
    ) -> ServiceResult<Page<LayeringProtocol>> {
        let results = self.search(filter)?;
        Ok(search::paginate(results, page, page_size))
    }

    pub fn get_by_id(&mut self, protocol_id: &str) -> ServiceResult<Option<LayeringProtocol>> {
        Ok(self.cache()?.protocol(protocol_id).cloned())
    }

    fn ranked_active(
        &mut self,
        sort: SortKey,
        limit: usize,
    ) -> ServiceResult<Vec<LayeringProtocol>> {
        let mut ranked = self.search(&ProtocolFilter {
            sort: Some(sort),
            ..ProtocolFilter::default()
        })?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Active protocols, best compatibility first.
    pub fn recommended_protocols(
        &mut self,
        limit: usize,
    ) -> ServiceResult<Vec<LayeringProtocol>> {
        self.ranked_active(SortKey::Compatibility, limit)
    }

    /// Active protocols, highest savings first.
    pub fn most_profitable_protocols(
        &mut self,
        limit: usize,
    ) -> ServiceResult<Vec<LayeringProtocol>> {
        self.ranked_active(SortKey::Savings, limit)
    }

    pub fn protocol_detail(&mut self, protocol_id: &str) -> ServiceResult<Option<ProtocolDetail>> {
        let catalog = self.catalog.clone();
        let cache = self.cache()?;
        let Some(protocol) = cache.protocol(protocol_id) else {
            return Ok(None);
        };
        Ok(Some(ProtocolDetail {
            items: protocol
                .assets()
                .iter()
                .filter_map(|id| catalog.fragrance(id))
                .cloned()
                .collect(),
            reference: catalog
                .reference(&protocol.cost_analysis().reference_id)
                .cloned(),
            is_favorite: cache.favorites.iter().any(|id| id == protocol_id),
            protocol: protocol.clone(),
        }))
    }

    // ── Favorites ───────────────────────────────────────

    /// Flips the favorite state and returns the new one.
    pub fn toggle_favorite(&mut self, protocol_id: &str) -> ServiceResult<bool> {
        if self.cache()?.protocol(protocol_id).is_none() {
            return Err(ServiceError::ProtocolNotFound(protocol_id.to_string()));
        }

        let mut cache = self.take_cache()?;
        let favorite = match cache.favorites.iter().position(|id| id == protocol_id) {
            Some(position) => {
                cache.favorites.remove(position);
                false
            }
            None => {
                cache.favorites.push(protocol_id.to_string());
                true
            }
        };
        self.store.save_favorites(&cache.favorites)?;
        cache.apply_favorites();
        self.cache = Some(cache);

        info!("event=favorite_toggle module=service status=ok id={protocol_id} favorite={favorite}");
        Ok(favorite)
    }

    pub fn favorites(&mut self) -> ServiceResult<Vec<String>> {
        Ok(self.cache()?.favorites.clone())
    }

    pub fn is_favorite(&mut self, protocol_id: &str) -> ServiceResult<bool> {
        Ok(self.cache()?.favorites.iter().any(|id| id == protocol_id))
    }

    pub fn favorite_protocols(&mut self) -> ServiceResult<Vec<LayeringProtocol>> {
        let cache = self.cache()?;
        Ok(cache
            .protocols
            .iter()
            .filter(|protocol| cache.favorites.iter().any(|id| id == protocol.id()))
            .cloned()
            .collect())
    }

    // ── Usage & fiscal ──────────────────────────────────

    /// Appends a ledger entry, bumps the use counter and refreshes the summary.
    pub fn register_usage(&mut self, protocol_id: &str) -> ServiceResult<UsageReceipt> {
        let mut cache = self.take_cache()?;
        let Some(position) = cache
            .protocols
            .iter()
            .position(|protocol| protocol.id() == protocol_id)
        else {
            self.cache = Some(cache);
            return Err(ServiceError::ProtocolNotFound(protocol_id.to_string()));
        };
        let protocol = &mut cache.protocols[position];

        let analysis = protocol.cost_analysis().clone();
        protocol.record_use();

        let history = self.store.append_usage(UsageRecord {
            protocol_id: protocol_id.to_string(),
            used_at: Utc::now(),
            saving: analysis.savings,
            cost: analysis.real_cost,
        })?;
        let summary = fiscal::summarize_usage_history(&history);
        self.store.save_savings_summary(&summary)?;
        self.store.save_protocols(&cache.protocols)?;
        self.cache = Some(cache);

        info!(
            "event=usage_register module=service status=ok id={protocol_id} saving={} total_saved={}",
            analysis.savings, summary.total_saved
        );
        Ok(UsageReceipt {
            saving: analysis.savings,
            total_saved: summary.total_saved,
        })
    }

    /// Summary derived from the ledger; the persisted copy is refreshed when stale.
    pub fn savings_summary(&mut self) -> ServiceResult<SavingsSummary> {
        let summary = fiscal::summarize_usage_history(&self.store.load_usage_history()?);
        match self.store.load_savings_summary()? {
            Some(stored) if stored == summary => {}
            Some(_) => {
                warn!(
                    "event=savings_summary module=service status=skip error_code=summary_stale uses={}",
                    summary.uses
                );
                self.store.save_savings_summary(&summary)?;
            }
            None => self.store.save_savings_summary(&summary)?,
        }
        Ok(summary)
    }

    pub fn financial_report(&mut self) -> ServiceResult<FinancialReport> {
        let history = self.store.load_usage_history()?;
        let catalog = self.catalog.clone();
        let cache = self.cache()?;
        Ok(fiscal::financial_report(
            &catalog,
            &cache.protocols,
            &history,
            Utc::now(),
        ))
    }

    pub fn usage_history(&self) -> ServiceResult<Vec<UsageRecord>> {
        Ok(self.store.load_usage_history()?)
    }

    pub fn quick_savings(
        &self,
        reference_price: f64,
        applications: &[SprayApplication],
    ) -> QuickSavings {
        fiscal::quick_savings(&self.catalog, reference_price, applications)
    }

    pub fn stats(&mut self) -> ServiceResult<EngineStats> {
        let uses = self.store.load_usage_history()?.len();
        let storage = self.store.storage_usage()?;
        let catalog = self.catalog.clone();
        let cache = self.cache()?;

        let mut counts = ProtocolCounts {
            total: cache.protocols.len(),
            ..ProtocolCounts::default()
        };
        let mut savings = 0.0;
        let mut compatibility = 0.0;
        for protocol in cache.active() {
            counts.active += 1;
            savings += protocol.cost_analysis().savings;
            compatibility += protocol.compatibility().score;
            match protocol.compatibility().tier {
                Tier::Alpha => counts.alpha += 1,
                Tier::Beta => counts.beta += 1,
                Tier::Gamma => counts.gamma += 1,
                Tier::Delta => counts.delta += 1,
            }
        }
        let mean_compatibility = if counts.active > 0 {
            compatibility / counts.active as f64
        } else {
            0.0
        };

        Ok(EngineStats {
            protocols: counts,
            item_count: cache.inventory.len(),
            collection_value: catalog.collection_value(cache.inventory.as_slice()),
            favorites: cache.favorites.len(),
            uses,
            max_potential_savings: round_to(savings, 2),
            mean_compatibility: round_to(mean_compatibility, 1),
            storage,
        })
    }

    // ── Backup ──────────────────────────────────────────

    pub fn export_all(&self) -> ServiceResult<ExportDocument> {
        Ok(self.store.export_all(Utc::now())?)
    }

    /// Replaces all state with `document`, then reloads the session.
    ///
    /// # Errors
    /// - `Store(ImportFormat)` when the document is rejected; state is untouched.
    pub fn import_all(&mut self, document: &ExportDocument) -> ServiceResult<InitSummary> {
        self.store.import_all(document, Utc::now())?;
        self.invalidate();
        self.initialize(false)
    }

    /// Wipes the namespace and regenerates from the full catalog.
    pub fn reset_all(&mut self) -> ServiceResult<InitSummary> {
        self.store.clear_all()?;
        self.invalidate();
        info!("event=store_reset module=service status=ok");
        self.initialize(true)
    }
}
