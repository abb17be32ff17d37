//! String key-value store contract and its SQLite implementation.

use super::StoreResult;
use crate::db::{open_db, open_db_in_memory};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Minimal async-storage style contract over string keys and values.
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;
    fn remove_item(&self, key: &str) -> StoreResult<()>;
    /// Values in the order of `keys`; missing keys map to `None`.
    fn multi_get(&self, keys: &[String]) -> StoreResult<Vec<(String, Option<String>)>>;
    /// Writes every entry or none.
    fn multi_set(&self, entries: &[(String, String)]) -> StoreResult<()>;
    /// Removes every key or none.
    fn multi_remove(&self, keys: &[String]) -> StoreResult<()>;
    fn get_all_keys(&self) -> StoreResult<Vec<String>>;
}

/// SQLite-backed key-value store owning its connection.
pub struct SqliteKvStore {
    conn: Connection,
}

impl SqliteKvStore {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

const UPSERT_SQL: &str = "INSERT INTO kv_store (key, value, updated_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at;";

impl KeyValueStore for SqliteKvStore {
    fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1;", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn
            .execute(UPSERT_SQL, params![key, value, Utc::now().timestamp_millis()])?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1;", [key])?;
        Ok(())
    }

    fn multi_get(&self, keys: &[String]) -> StoreResult<Vec<(String, Option<String>)>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM kv_store WHERE key = ?1;")?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = stmt
                .query_row([key], |row| row.get::<_, String>(0))
                .optional()?;
            values.push((key.clone(), value));
        }
        Ok(values)
    }

    fn multi_set(&self, entries: &[(String, String)]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            let now = Utc::now().timestamp_millis();
            for (key, value) in entries {
                stmt.execute(params![key, value, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn multi_remove(&self, keys: &[String]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM kv_store WHERE key = ?1;")?;
            for key in keys {
                stmt.execute([key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_all_keys(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_store ORDER BY key;")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}
