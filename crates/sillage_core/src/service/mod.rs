//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate engine and store calls into session-level use cases.
//! - Keep UI/FFI layers decoupled from storage details.

pub mod inventory_insights;
pub mod layering_service;

pub use inventory_insights::{
    FamilyCount, FamilyGroup, HouseCount, HouseGroup, InventorySummary, PurchaseSuggestion,
};
pub use layering_service::{
    BatchAddition, EngineStats, InitSummary, InventoryChange, LayeringService, OwnedItem,
    ProtocolCounts, ProtocolDetail, ServiceError, ServiceResult, UsageReceipt,
};
