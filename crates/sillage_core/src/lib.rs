//! Core engine for fragrance layering protocols and their fiscal audit.
//! This crate is the single source of truth for business invariants.

pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use catalog::{Catalog, CatalogError};
pub use config::{EngineConfig, GeneratorConfig, RankingWeights, StoreConfig};
pub use engine::fiscal::{FiscalError, QuickSavings, SprayApplication};
pub use engine::search::{Page, ProtocolFilter, SortKey};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::fragrance::{Concentration, Family, FragranceItem, ReferenceItem};
pub use model::protocol::{LayeringProtocol, ProtocolRecord, Tier, ValidationError};
pub use model::savings::{FinancialReport, SavingsEntry, SavingsSummary, UsageRecord};
pub use service::{
    BatchAddition, EngineStats, InitSummary, InventoryChange, InventorySummary, LayeringService,
    OwnedItem, ProtocolDetail, PurchaseSuggestion, ServiceError, ServiceResult, UsageReceipt,
};
pub use store::{
    ExportDocument, KeyValueStore, SqliteKvStore, StorageUsage, StoreError, EXPORT_FORMAT_VERSION,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
