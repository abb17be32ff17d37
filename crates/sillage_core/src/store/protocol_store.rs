//! Namespaced, chunked persistence of protocols and user state.
//!
//! # Responsibility
//! - Own the key layout under the configured namespace.
//! - Write protocols in fixed-size chunks plus an index record.
//! - Load tolerantly: corrupt chunks or records are skipped and logged.
//! - Export and import the whole state as one JSON document.
//!
//! # Invariants
//! - A protocol save writes index and chunks in one atomic `multi_set`.
//! - Import validates the full document before writing anything.
//! - Usage history never exceeds `usage_history_cap` entries.
//! - The stored savings summary is always derived from the stored history.

use super::kv::KeyValueStore;
use super::{StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::engine::fiscal::summarize_usage_history;
use crate::model::protocol::LayeringProtocol;
use crate::model::savings::{SavingsSummary, UsageRecord};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

/// Version stamped on exported documents.
pub const EXPORT_FORMAT_VERSION: &str = "1.0.0";

const PROTOCOLS: &str = "protocols";
const INVENTORY: &str = "inventory";
const FAVORITES: &str = "favorites";
const USAGE_HISTORY: &str = "usage_history";
const SAVINGS: &str = "savings";
const METADATA: &str = "metadata";

static STORAGE_CATEGORY_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(_chunk_\d+|_index)$").expect("valid storage category regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ChunkIndex {
    total_chunks: usize,
    total_protocols: usize,
}

/// Bookkeeping record about the persisted protocol set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageMetadata {
    pub format_version: String,
    pub generated_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub protocol_count: usize,
    pub item_count: usize,
    pub deactivated_count: usize,
    pub imported_from: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Bytes used under the namespace, grouped by base key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total_bytes: usize,
    pub total_kb: f64,
    pub breakdown: BTreeMap<String, usize>,
}

/// Result of a tolerant protocol load.
#[derive(Debug, Clone, Default)]
pub struct ProtocolLoad {
    pub protocols: Vec<LayeringProtocol>,
    pub skipped_chunks: usize,
    pub skipped_records: usize,
}

/// Whole-state backup document.
///
/// `version` is optional on the wire so that a missing marker is reported
/// as an import error rather than a parse error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDocument {
    pub version: Option<String>,
    pub export_date: Option<DateTime<Utc>>,
    pub protocols: Vec<Value>,
    pub inventory: Vec<String>,
    pub favorites: Vec<String>,
    pub usage_history: Vec<UsageRecord>,
    pub savings_summary: Option<SavingsSummary>,
    pub metadata: Option<StorageMetadata>,
}

/// Typed view over a [`KeyValueStore`].
pub struct ProtocolStore<S> {
    kv: S,
    config: StoreConfig,
}

impl<S: KeyValueStore> ProtocolStore<S> {
    pub fn new(kv: S, config: StoreConfig) -> Self {
        Self { kv, config }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.config.namespace, name)
    }

    fn index_key(&self) -> String {
        self.key(&format!("{PROTOCOLS}_index"))
    }

    fn chunk_key(&self, chunk: usize) -> String {
        self.key(&format!("{PROTOCOLS}_chunk_{chunk}"))
    }

    fn namespace_prefix(&self) -> String {
        format!("{}/", self.config.namespace)
    }

    // ── Protocols ───────────────────────────────────────

    /// Replaces the persisted protocol set.
    pub fn save_protocols(&self, protocols: &[LayeringProtocol]) -> StoreResult<()> {
        let started_at = Instant::now();
        let (entries, total_chunks) = self.protocol_entries(protocols)?;

        self.kv.multi_set(&entries)?;
        self.remove_stale_chunks(total_chunks)?;

        info!(
            "event=protocol_save module=store status=ok protocols={} chunks={} duration_ms={}",
            protocols.len(),
            total_chunks,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn protocol_entries(
        &self,
        protocols: &[LayeringProtocol],
    ) -> StoreResult<(Vec<(String, String)>, usize)> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut entries = Vec::new();
        for (chunk, slice) in protocols.chunks(chunk_size).enumerate() {
            entries.push((self.chunk_key(chunk), serde_json::to_string(slice)?));
        }

        let total_chunks = entries.len();
        let index = ChunkIndex {
            total_chunks,
            total_protocols: protocols.len(),
        };
        entries.push((self.index_key(), serde_json::to_string(&index)?));
        Ok((entries, total_chunks))
    }

    /// Removes chunk keys numbered `keep` and above.
    ///
    /// Scans the namespace rather than trusting the previous index, so chunks
    /// orphaned by a corrupt or missing index are collected too.
    fn remove_stale_chunks(&self, keep: usize) -> StoreResult<()> {
        let chunk_prefix = self.key(&format!("{PROTOCOLS}_chunk_"));
        let stale = self
            .namespace_keys()?
            .into_iter()
            .filter(|key| {
                key.strip_prefix(&chunk_prefix)
                    .and_then(|number| number.parse::<usize>().ok())
                    .is_some_and(|chunk| chunk >= keep)
            })
            .collect::<Vec<_>>();
        if stale.is_empty() {
            return Ok(());
        }
        debug!(
            "event=protocol_save module=store status=ok stale_chunks={}",
            stale.len()
        );
        self.kv.multi_remove(&stale)
    }

    fn read_index(&self) -> Option<ChunkIndex> {
        let raw = match self.kv.get_item(&self.index_key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("event=protocol_load module=store status=error error_code=index_read_failed error={err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(index) => Some(index),
            Err(err) => {
                warn!("event=protocol_load module=store status=skip error_code=index_corrupt error={err}");
                None
            }
        }
    }

    /// Loads every readable protocol, skipping corrupt chunks and records.
    ///
    /// # Errors
    /// - Only backend failures; corruption is reported through the counters.
    pub fn load_protocols(&self) -> StoreResult<ProtocolLoad> {
        let started_at = Instant::now();
        let Some(index) = self.read_index() else {
            return Ok(ProtocolLoad::default());
        };

        let keys = (0..index.total_chunks)
            .map(|chunk| self.chunk_key(chunk))
            .collect::<Vec<_>>();
        let mut load = ProtocolLoad {
            protocols: Vec::with_capacity(index.total_protocols),
            ..ProtocolLoad::default()
        };

        for (key, value) in self.kv.multi_get(&keys)? {
            let Some(raw) = value else {
                warn!("event=protocol_load module=store status=skip error_code=chunk_missing key={key}");
                load.skipped_chunks += 1;
                continue;
            };
            let records = match serde_json::from_str::<Vec<Value>>(&raw) {
                Ok(records) => records,
                Err(err) => {
                    warn!("event=protocol_load module=store status=skip error_code=chunk_corrupt key={key} error={err}");
                    load.skipped_chunks += 1;
                    continue;
                }
            };
            for record in records {
                match LayeringProtocol::from_json(record) {
                    Ok(protocol) => load.protocols.push(protocol),
                    Err(err) => {
                        warn!("event=protocol_load module=store status=skip error_code=record_corrupt key={key} error={err}");
                        load.skipped_records += 1;
                    }
                }
            }
        }

        info!(
            "event=protocol_load module=store status=ok protocols={} skipped_chunks={} skipped_records={} duration_ms={}",
            load.protocols.len(),
            load.skipped_chunks,
            load.skipped_records,
            started_at.elapsed().as_millis()
        );
        Ok(load)
    }

    // ── Simple records ──────────────────────────────────

    fn save_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> StoreResult<()> {
        self.kv.set_item(&self.key(name), &serde_json::to_string(value)?)
    }

    /// Reads a JSON record; a corrupt value is logged and treated as absent.
    fn load_json<T: DeserializeOwned>(&self, name: &str) -> StoreResult<Option<T>> {
        let Some(raw) = self.kv.get_item(&self.key(name))? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!("event=record_load module=store status=skip error_code=record_corrupt key={name} error={err}");
                Ok(None)
            }
        }
    }

    pub fn save_inventory(&self, ids: &[String]) -> StoreResult<()> {
        self.save_json(INVENTORY, ids)
    }

    pub fn load_inventory(&self) -> StoreResult<Vec<String>> {
        Ok(self.load_json(INVENTORY)?.unwrap_or_default())
    }

    pub fn save_favorites(&self, ids: &[String]) -> StoreResult<()> {
        self.save_json(FAVORITES, ids)
    }

    pub fn load_favorites(&self) -> StoreResult<Vec<String>> {
        Ok(self.load_json(FAVORITES)?.unwrap_or_default())
    }

    pub fn save_savings_summary(&self, summary: &SavingsSummary) -> StoreResult<()> {
        self.save_json(SAVINGS, summary)
    }

    pub fn load_savings_summary(&self) -> StoreResult<Option<SavingsSummary>> {
        self.load_json(SAVINGS)
    }

    /// Stamps `updated_at` and writes the metadata record.
    pub fn save_metadata(&self, metadata: &StorageMetadata, now: DateTime<Utc>) -> StoreResult<()> {
        let mut metadata = metadata.clone();
        metadata.updated_at = Some(now);
        self.save_json(METADATA, &metadata)
    }

    pub fn load_metadata(&self) -> StoreResult<Option<StorageMetadata>> {
        self.load_json(METADATA)
    }

    // ── Usage ledger ────────────────────────────────────

    /// Ledger entries, skipping any that fail to parse.
    pub fn load_usage_history(&self) -> StoreResult<Vec<UsageRecord>> {
        let Some(entries) = self.load_json::<Vec<Value>>(USAGE_HISTORY)? else {
            return Ok(Vec::new());
        };
        let mut history = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value(entry) {
                Ok(record) => history.push(record),
                Err(err) => {
                    warn!("event=usage_load module=store status=skip error_code=record_corrupt error={err}");
                }
            }
        }
        Ok(history)
    }

    /// Appends one entry, rotating out the oldest past the cap.
    pub fn append_usage(&self, record: UsageRecord) -> StoreResult<Vec<UsageRecord>> {
        let mut history = self.load_usage_history()?;
        history.push(record);
        let cap = self.config.usage_history_cap;
        if history.len() > cap {
            history.drain(..history.len() - cap);
        }
        self.save_json(USAGE_HISTORY, &history)?;
        Ok(history)
    }

    // ── Maintenance ─────────────────────────────────────

    fn namespace_keys(&self) -> StoreResult<Vec<String>> {
        let prefix = self.namespace_prefix();
        Ok(self
            .kv
            .get_all_keys()?
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect())
    }

    /// Bytes stored under the namespace; chunk and index keys fold into their base key.
    pub fn storage_usage(&self) -> StoreResult<StorageUsage> {
        let keys = self.namespace_keys()?;
        let mut total_bytes = 0;
        let mut breakdown = BTreeMap::new();

        for (key, value) in self.kv.multi_get(&keys)? {
            let bytes = value.map_or(0, |value| value.len());
            total_bytes += bytes;
            let category = STORAGE_CATEGORY_SUFFIX.replace(&key, "").into_owned();
            *breakdown.entry(category).or_insert(0) += bytes;
        }

        Ok(StorageUsage {
            total_bytes,
            total_kb: (total_bytes as f64 / 1024.0 * 100.0).round() / 100.0,
            breakdown,
        })
    }

    /// Removes every key under the namespace.
    pub fn clear_all(&self) -> StoreResult<()> {
        let keys = self.namespace_keys()?;
        if !keys.is_empty() {
            self.kv.multi_remove(&keys)?;
        }
        info!(
            "event=store_clear module=store status=ok keys={}",
            keys.len()
        );
        Ok(())
    }

    // ── Backup ──────────────────────────────────────────

    pub fn export_all(&self, now: DateTime<Utc>) -> StoreResult<ExportDocument> {
        let protocols = self
            .load_protocols()?
            .protocols
            .iter()
            .map(LayeringProtocol::to_json)
            .collect::<Result<Vec<_>, _>>()?;

        let document = ExportDocument {
            version: Some(EXPORT_FORMAT_VERSION.to_string()),
            export_date: Some(now),
            protocols,
            inventory: self.load_inventory()?,
            favorites: self.load_favorites()?,
            usage_history: self.load_usage_history()?,
            savings_summary: self.load_savings_summary()?,
            metadata: self.load_metadata()?,
        };
        info!(
            "event=store_export module=store status=ok protocols={} usage={}",
            document.protocols.len(),
            document.usage_history.len()
        );
        Ok(document)
    }

    /// Replaces the persisted state with `document`.
    ///
    /// # Errors
    /// - `ImportFormat` when the version marker is missing or a protocol is
    ///   invalid. Nothing is written in that case.
    ///
    /// The document's savings summary is ignored; the stored one is rebuilt
    /// from the imported usage history.
    pub fn import_all(&self, document: &ExportDocument, now: DateTime<Utc>) -> StoreResult<()> {
        let version = document
            .version
            .as_deref()
            .filter(|version| !version.trim().is_empty())
            .ok_or_else(|| StoreError::ImportFormat("missing version marker".to_string()))?;

        let protocols = document
            .protocols
            .iter()
            .enumerate()
            .map(|(position, value)| {
                LayeringProtocol::from_json(value.clone()).map_err(|err| {
                    StoreError::ImportFormat(format!("protocol #{position} is invalid: {err}"))
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut history = document.usage_history.clone();
        let cap = self.config.usage_history_cap;
        if history.len() > cap {
            history.drain(..history.len() - cap);
        }
        let summary = summarize_usage_history(&history);

        let mut metadata = document.metadata.clone().unwrap_or_default();
        metadata.imported_from = Some(version.to_string());
        metadata.protocol_count = protocols.len();
        metadata.item_count = document.inventory.len();
        metadata.updated_at = Some(now);

        let (mut entries, total_chunks) = self.protocol_entries(&protocols)?;
        entries.push((self.key(INVENTORY), serde_json::to_string(&document.inventory)?));
        entries.push((self.key(FAVORITES), serde_json::to_string(&document.favorites)?));
        entries.push((self.key(USAGE_HISTORY), serde_json::to_string(&history)?));
        entries.push((self.key(METADATA), serde_json::to_string(&metadata)?));
        entries.push((self.key(SAVINGS), serde_json::to_string(&summary)?));

        self.kv.multi_set(&entries)?;
        self.remove_stale_chunks(total_chunks)?;

        info!(
            "event=store_import module=store status=ok version={version} protocols={}",
            protocols.len()
        );
        Ok(())
    }
}
