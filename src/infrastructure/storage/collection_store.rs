use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::debug;

use crate::application::ports::CollectionStore;
use crate::shared::AppError;

/// SQLite に名前付きコレクションを保存する
#[derive(Clone)]
pub struct SqliteCollectionStore {
    pool: SqlitePool,
}

impl SqliteCollectionStore {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // インメモリ DB は接続ごとに別物になるので一本に絞る
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        debug!(database_url, "opened collection store");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                item_key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(collection, item_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), AppError> {
        let json = serde_json::to_string(value)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO collection_items (collection, item_key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, item_key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(json)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, AppError> {
        let row = sqlx::query(
            "SELECT value FROM collection_items WHERE collection = ?1 AND item_key = ?2",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM collection_items WHERE collection = ?1 AND item_key = ?2")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, AppError> {
        let rows = sqlx::query("SELECT value FROM collection_items WHERE collection = ?1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("value");
                serde_json::from_str(&raw).map_err(AppError::from)
            })
            .collect()
    }

    async fn clear(&self, collection: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM collection_items WHERE collection = ?1")
            .bind(collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// テストや永続化不要な環境向けのコレクションストア
#[derive(Default)]
pub struct MemoryCollectionStore {
    collections: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl MemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CollectionStore for MemoryCollectionStore {
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), AppError> {
        let mut collections = self.collections.write().await;
        let items = collections.entry(collection.to_string()).or_default();
        match items.iter_mut().find(|(existing, _)| existing == key) {
            Some((_, existing)) => *existing = value.clone(),
            None => items.push((key.to_string(), value.clone())),
        }
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, AppError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|items| {
            items
                .iter()
                .find(|(existing, _)| existing == key)
                .map(|(_, value)| value.clone())
        }))
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), AppError> {
        if let Some(items) = self.collections.write().await.get_mut(collection) {
            items.retain(|(existing, _)| existing != key);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, AppError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|items| items.iter().map(|(_, value)| value.clone()).collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: &str) -> Result<(), AppError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}
