//! Persistence over a string key-value store.
//!
//! # Responsibility
//! - Abstract the key-value backend behind [`KeyValueStore`].
//! - Own the namespaced key layout for protocols, inventory and the ledger.
//!
//! # Invariants
//! - Multi-key writes are atomic per call.
//! - A corrupt persisted record is skipped and logged, never fatal on load.

pub mod kv;
pub mod protocol_store;

pub use kv::{KeyValueStore, SqliteKvStore};
pub use protocol_store::{
    ExportDocument, ProtocolStore, StorageMetadata, StorageUsage, EXPORT_FORMAT_VERSION,
};

use crate::db::DbError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid import document: {0}")]
    ImportFormat(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
