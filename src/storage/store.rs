//! SQLite-backed credential store.
//!
//! One table keyed by `(session_id, key)` holds every record as a CBOR
//! blob. Reads are forgiving: any decode or query failure surfaces as a
//! missing record, because the protocol layer treats absent keys as "start
//! fresh" rather than fatal.

use super::{from_cbor, to_cbor, StoreError};
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use tracing::{debug, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS auth_records (
    session_id TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      BLOB NOT NULL,
    PRIMARY KEY (session_id, key)
)
"#;

/// Handle to one session's records. Cloning shares the pool.
#[derive(Clone)]
pub struct CredentialStore {
    pool: Pool<Sqlite>,
    session_id: String,
}

impl CredentialStore {
    /// Open (and create if needed) the store at `db_url`, scoped to one
    /// session's namespace.
    pub async fn open(db_url: &str, session_id: impl Into<String>) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            session_id: session_id.into(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Read one record. Missing, unreadable, and undecodable all collapse
    /// to `None`; the failure is logged, never propagated.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let row = sqlx::query("SELECT value FROM auth_records WHERE session_id = ? AND key = ?")
            .bind(&self.session_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await;

        let row = match row {
            Ok(row) => row?,
            Err(e) => {
                warn!(key, error = %e, "record read failed");
                return None;
            }
        };

        let blob: Vec<u8> = row.get("value");
        match from_cbor(&blob) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "record decode failed, treating as absent");
                None
            }
        }
    }

    /// Write one record, replacing any previous value.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let blob = to_cbor(value)?;
        sqlx::query(
            "INSERT INTO auth_records (session_id, key, value) VALUES (?, ?, ?)
             ON CONFLICT (session_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(&self.session_id)
        .bind(key)
        .bind(blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM auth_records WHERE session_id = ? AND key = ?")
            .bind(&self.session_id)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read a batch of keys concurrently. The result maps every requested
    /// key; absent records map to `None`.
    pub async fn read_batch<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> HashMap<String, Option<T>> {
        let lookups = keys.iter().map(|key| async move {
            let value = self.read::<T>(key).await;
            (key.clone(), value)
        });
        join_all(lookups).await.into_iter().collect()
    }

    /// Apply a batch of writes and deletes concurrently. A `None` entry
    /// deletes the key. Each entry fails or succeeds independently; the
    /// first error is reported after the whole batch has run.
    pub async fn write_batch<T: Serialize>(
        &self,
        entries: &HashMap<String, Option<T>>,
    ) -> Result<(), StoreError> {
        let ops = entries.iter().map(|(key, value)| async move {
            match value {
                Some(value) => self.write(key, value).await,
                None => self.delete(key).await,
            }
            .map_err(|e| {
                warn!(key, error = %e, "batch entry failed");
                e
            })
        });

        let results = join_all(ops).await;
        debug!(total = results.len(), "batch applied");
        results.into_iter().collect()
    }
}
