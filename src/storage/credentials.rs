// OfflineKit - Offline download lifecycle core for mobile video players
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Credential storage
//!
//! Durable `key -> blob` storage for offline playback credentials. Two keys
//! exist per content item:
//! - `"<identifier>.content"` - the bookmark returned by the engine on completion
//! - `"<identifier>.license"` - the persisted DRM license, if any
//!
//! Blobs are opaque to this module. Writes to distinct keys never interfere,
//! so one store can be shared by every coordinator.

use crate::content::ContentIdentifier;
use crate::error::{OfflineError, Result};
use crate::storage::Database;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value store for license and bookmark blobs
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite the blob stored under `key`
    async fn set(&self, key: &str, blob: &[u8]) -> Result<()>;

    /// Read the blob stored under `key`, `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove `key`; removing a missing key succeeds
    async fn remove(&self, key: &str) -> Result<()>;
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(OfflineError::invalid_input("Credential key must not be empty"));
    }
    Ok(())
}

/// SQLite-backed credential store
///
/// Rows live in the `Credentials` table created by the migrations.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(db: &Database) -> Self {
        Self::from_pool(db.pool().clone())
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List every stored key in ascending order
    pub async fn keys(&self) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM Credentials ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn set(&self, key: &str, blob: &[u8]) -> Result<()> {
        check_key(key)?;

        sqlx::query(
            r#"
            INSERT INTO Credentials (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(|e| OfflineError::CredentialStore(format!("Failed to write '{}': {}", key, e)))?;

        debug!(key, bytes = blob.len(), "Stored credential");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;

        let value: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM Credentials WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    OfflineError::CredentialStore(format!("Failed to read '{}': {}", key, e))
                })?;

        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;

        let result = sqlx::query("DELETE FROM Credentials WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                OfflineError::CredentialStore(format!("Failed to remove '{}': {}", key, e))
            })?;

        debug!(key, removed = result.rows_affected(), "Removed credential");
        Ok(())
    }
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn set(&self, key: &str, blob: &[u8]) -> Result<()> {
        check_key(key)?;
        self.entries.write().await.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        check_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Both credential blobs of one content item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    pub bookmark: Option<Vec<u8>>,
    pub license: Option<Vec<u8>>,
}

impl CredentialRecord {
    /// Read both keys for `content_id`
    pub async fn load(store: &dyn CredentialStore, content_id: &ContentIdentifier) -> Result<Self> {
        Ok(Self {
            bookmark: store.get(&content_id.content_key()).await?,
            license: store.get(&content_id.license_key()).await?,
        })
    }

    /// Write the blobs that are present; absent blobs leave their key untouched
    pub async fn save(&self, store: &dyn CredentialStore, content_id: &ContentIdentifier) -> Result<()> {
        if let Some(bookmark) = &self.bookmark {
            store.set(&content_id.content_key(), bookmark).await?;
        }
        if let Some(license) = &self.license {
            store.set(&content_id.license_key(), license).await?;
        }
        Ok(())
    }

    /// Remove both keys for `content_id`
    pub async fn remove_all(store: &dyn CredentialStore, content_id: &ContentIdentifier) -> Result<()> {
        store.remove(&content_id.license_key()).await?;
        store.remove(&content_id.content_key()).await?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.bookmark.is_none() && self.license.is_none()
    }
}
