//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the engine's commands and queries to Dart via FRB.
//! - Hold the single process-wide session behind a mutex.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Failures come back as envelopes with `ok = false` and a message.
//! - Rich results travel as JSON payloads with the core's serde shapes.

use log::warn;
use serde::Serialize;
use sillage_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    EngineConfig, ExportDocument, InitSummary, InventoryChange, LayeringService, ProtocolFilter,
    ServiceResult, SqliteKvStore,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

const DB_FILE_NAME: &str = "sillage.sqlite3";
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 200;

static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static SESSION: Mutex<Option<LayeringService<SqliteKvStore>>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns an empty string on success and the error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Session lifecycle envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitResponse {
    pub ok: bool,
    pub protocol_count: u32,
    pub item_count: u32,
    pub is_first_run: bool,
    pub message: String,
}

impl InitResponse {
    fn from_result(result: Result<InitSummary, String>) -> Self {
        match result {
            Ok(summary) => Self {
                ok: true,
                protocol_count: summary.protocol_count as u32,
                item_count: summary.item_count as u32,
                is_first_run: summary.is_first_run,
                message: format!("{} protocol(s) ready.", summary.protocol_count),
            },
            Err(message) => Self {
                ok: false,
                protocol_count: 0,
                item_count: 0,
                is_first_run: false,
                message,
            },
        }
    }
}

/// Inventory mutation envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryResponse {
    pub ok: bool,
    pub affected: u32,
    pub generated: u32,
    pub message: String,
}

impl InventoryResponse {
    fn from_result(result: Result<InventoryChange, String>) -> Self {
        match result {
            Ok(change) => Self {
                ok: change.success,
                affected: change.affected as u32,
                generated: change.generated as u32,
                message: change.message,
            },
            Err(message) => Self {
                ok: false,
                affected: 0,
                generated: 0,
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageResponse {
    pub ok: bool,
    pub saving: f64,
    pub total_saved: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteResponse {
    pub ok: bool,
    pub favorite: bool,
    pub message: String,
}

/// Query envelope carrying a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonResponse {
    pub ok: bool,
    /// JSON document; `null` on failure.
    pub payload: String,
    pub message: String,
}

impl JsonResponse {
    fn from_result<T: Serialize>(result: Result<T, String>) -> Self {
        let encoded = result.and_then(|value| {
            serde_json::to_string(&value).map_err(|err| format!("encode failed: {err}"))
        });
        match encoded {
            Ok(payload) => Self {
                ok: true,
                payload,
                message: String::new(),
            },
            Err(message) => Self {
                ok: false,
                payload: "null".to_string(),
                message,
            },
        }
    }
}

// ── Commands ────────────────────────────────────────────

/// Opens the session on `db_path`, replacing any open session.
///
/// Returns an empty string on success and the error message otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn configure_db_path(db_path: String) -> String {
    let trimmed = db_path.trim();
    if trimmed.is_empty() {
        return "configure_db_path failed: db path is empty".to_string();
    }
    let service = match open_session_at(Path::new(trimmed)) {
        Ok(service) => service,
        Err(err) => return format!("configure_db_path failed: {err}"),
    };
    match SESSION.lock() {
        Ok(mut guard) => {
            *guard = Some(service);
            String::new()
        }
        Err(_) => "configure_db_path failed: session lock poisoned".to_string(),
    }
}

/// Loads persisted state, or seeds it on first run or when forced.
pub fn engine_initialize(force_regenerate: bool) -> InitResponse {
    InitResponse::from_result(with_session("engine_initialize", |service| {
        service.initialize(force_regenerate)
    }))
}

pub fn inventory_add(fragrance_id: String) -> InventoryResponse {
    InventoryResponse::from_result(with_session("inventory_add", |service| {
        service.add_item(fragrance_id.trim())
    }))
}

/// Adds several items with one resynchronization. Payload is the batch outcome.
pub fn inventory_add_many(fragrance_ids: Vec<String>) -> JsonResponse {
    let ids = fragrance_ids
        .iter()
        .map(|id| id.trim())
        .collect::<Vec<_>>();
    JsonResponse::from_result(with_session("inventory_add_many", |service| {
        service.add_items(ids.as_slice())
    }))
}

pub fn inventory_remove(fragrance_id: String) -> InventoryResponse {
    InventoryResponse::from_result(with_session("inventory_remove", |service| {
        service.remove_item(fragrance_id.trim())
    }))
}

pub fn favorite_toggle(protocol_id: String) -> FavoriteResponse {
    match with_session("favorite_toggle", |service| {
        service.toggle_favorite(protocol_id.trim())
    }) {
        Ok(favorite) => FavoriteResponse {
            ok: true,
            favorite,
            message: String::new(),
        },
        Err(message) => FavoriteResponse {
            ok: false,
            favorite: false,
            message,
        },
    }
}

pub fn usage_register(protocol_id: String) -> UsageResponse {
    match with_session("usage_register", |service| {
        service.register_usage(protocol_id.trim())
    }) {
        Ok(receipt) => UsageResponse {
            ok: true,
            saving: receipt.saving,
            total_saved: receipt.total_saved,
            message: String::new(),
        },
        Err(message) => UsageResponse {
            ok: false,
            saving: 0.0,
            total_saved: 0.0,
            message,
        },
    }
}

/// Replaces all state with an exported JSON document.
pub fn backup_import(document_json: String) -> InitResponse {
    let document = match serde_json::from_str::<ExportDocument>(&document_json) {
        Ok(document) => document,
        Err(err) => {
            return InitResponse::from_result(Err(format!("backup_import failed: {err}")));
        }
    };
    InitResponse::from_result(with_session("backup_import", |service| {
        service.import_all(&document)
    }))
}

pub fn engine_reset() -> InitResponse {
    InitResponse::from_result(with_session("engine_reset", LayeringService::reset_all))
}

// ── Queries ─────────────────────────────────────────────

/// Filtered protocol list. An empty `filter_json` means the default filter.
#[flutter_rust_bridge::frb(sync)]
pub fn protocols_search(filter_json: String) -> JsonResponse {
    JsonResponse::from_result(parse_filter(&filter_json).and_then(|filter| {
        with_session("protocols_search", |service| service.search(&filter))
    }))
}

/// One page of the filtered list. `page` is 1-based.
#[flutter_rust_bridge::frb(sync)]
pub fn protocols_page(page: u32, page_size: Option<u32>, filter_json: String) -> JsonResponse {
    let page_size = normalize_page_size(page_size);
    JsonResponse::from_result(parse_filter(&filter_json).and_then(|filter| {
        with_session("protocols_page", |service| {
            service.paginate(page as usize, page_size as usize, &filter)
        })
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn protocol_get(protocol_id: String) -> JsonResponse {
    JsonResponse::from_result(with_session("protocol_get", |service| {
        service.get_by_id(protocol_id.trim())
    }))
}

/// Protocol with its items, reference and favorite flag; `null` when unknown.
#[flutter_rust_bridge::frb(sync)]
pub fn protocol_detail(protocol_id: String) -> JsonResponse {
    JsonResponse::from_result(with_session("protocol_detail", |service| {
        service.protocol_detail(protocol_id.trim())
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn protocols_recommended(limit: u32) -> JsonResponse {
    JsonResponse::from_result(with_session("protocols_recommended", |service| {
        service.recommended_protocols(limit as usize)
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn protocols_most_profitable(limit: u32) -> JsonResponse {
    JsonResponse::from_result(with_session("protocols_most_profitable", |service| {
        service.most_profitable_protocols(limit as usize)
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn favorite_protocols() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "favorite_protocols",
        LayeringService::favorite_protocols,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_owned() -> JsonResponse {
    JsonResponse::from_result(with_session("inventory_owned", LayeringService::owned_items))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_available() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "inventory_available",
        LayeringService::available_items,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_summary() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "inventory_summary",
        LayeringService::inventory_summary,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_by_family() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "inventory_by_family",
        LayeringService::inventory_by_family,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_by_house() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "inventory_by_house",
        LayeringService::inventory_by_house,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_top_value(limit: u32) -> JsonResponse {
    JsonResponse::from_result(with_session("inventory_top_value", |service| {
        service.top_value_items(limit as usize)
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn inventory_unused() -> JsonResponse {
    JsonResponse::from_result(with_session("inventory_unused", LayeringService::unused_items))
}

/// Catalog items worth buying next, best first.
#[flutter_rust_bridge::frb(sync)]
pub fn purchase_suggestions(limit: u32) -> JsonResponse {
    JsonResponse::from_result(with_session("purchase_suggestions", |service| {
        service.purchase_suggestions(limit as usize)
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn savings_summary() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "savings_summary",
        LayeringService::savings_summary,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn financial_report() -> JsonResponse {
    JsonResponse::from_result(with_session(
        "financial_report",
        LayeringService::financial_report,
    ))
}

#[flutter_rust_bridge::frb(sync)]
pub fn usage_history() -> JsonResponse {
    JsonResponse::from_result(with_session("usage_history", |service| {
        service.usage_history()
    }))
}

#[flutter_rust_bridge::frb(sync)]
pub fn engine_stats() -> JsonResponse {
    JsonResponse::from_result(with_session("engine_stats", LayeringService::stats))
}

#[flutter_rust_bridge::frb(sync)]
pub fn backup_export() -> JsonResponse {
    JsonResponse::from_result(with_session("backup_export", |service| {
        service.export_all()
    }))
}

// ── Session plumbing ────────────────────────────────────

fn normalize_page_size(page_size: Option<u32>) -> u32 {
    match page_size {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(value) => value.min(MAX_PAGE_SIZE),
    }
}

fn parse_filter(filter_json: &str) -> Result<ProtocolFilter, String> {
    let trimmed = filter_json.trim();
    if trimmed.is_empty() {
        return Ok(ProtocolFilter::default());
    }
    serde_json::from_str(trimmed).map_err(|err| format!("invalid filter: {err}"))
}

fn resolve_db_path() -> PathBuf {
    DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("SILLAGE_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(DB_FILE_NAME)
        })
        .clone()
}

fn open_session_at(path: &Path) -> Result<LayeringService<SqliteKvStore>, String> {
    let kv = SqliteKvStore::open(path).map_err(|err| format!("db open failed: {err}"))?;
    LayeringService::with_builtin_catalog(kv, EngineConfig::default())
        .map_err(|err| format!("session init failed: {err}"))
}

/// Runs `f` against the process-wide session, opening it on first use.
fn with_session<T>(
    operation: &str,
    f: impl FnOnce(&mut LayeringService<SqliteKvStore>) -> ServiceResult<T>,
) -> Result<T, String> {
    let mut guard = SESSION
        .lock()
        .map_err(|_| format!("{operation} failed: session lock poisoned"))?;
    if guard.is_none() {
        *guard = Some(open_session_at(&resolve_db_path()).map_err(|err| format!("{operation} failed: {err}"))?);
    }
    let Some(service) = guard.as_mut() else {
        return Err(format!("{operation} failed: session unavailable"));
    };
    f(service).map_err(|err| {
        warn!("event=ffi_call module=ffi status=error op={operation} error={err}");
        format!("{operation} failed: {err}")
    })
}
