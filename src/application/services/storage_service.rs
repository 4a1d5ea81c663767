use crate::application::ports::{CollectionStore, KeyValueStore, StoreScope};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// 永続／セッションの二つのストアと名前付きコレクションへの統一窓口
///
/// 失敗は例外にせずログに残し、`None` / `false` として返す。
/// 複数キーにまたがる原子性は提供しない（別プロセスとの競合は後勝ち）。
pub struct StorageService {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    collections: Arc<dyn CollectionStore>,
}

impl StorageService {
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        collections: Arc<dyn CollectionStore>,
    ) -> Self {
        Self {
            durable,
            session,
            collections,
        }
    }

    fn store(&self, scope: StoreScope) -> &Arc<dyn KeyValueStore> {
        match scope {
            StoreScope::Durable => &self.durable,
            StoreScope::Session => &self.session,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, scope: StoreScope, key: &str) -> Option<T> {
        let raw = match self.store(scope).get_item(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(?scope, key, error = %err, "failed to read from storage");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(?scope, key, error = %err, "failed to deserialize stored value");
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, scope: StoreScope, key: &str, value: &T) -> bool {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(?scope, key, error = %err, "failed to serialize value for storage");
                return false;
            }
        };

        match self.store(scope).set_item(key, &json).await {
            Ok(()) => {
                debug!(?scope, key, bytes = json.len(), "stored value");
                true
            }
            Err(err) => {
                warn!(?scope, key, error = %err, "failed to write to storage");
                false
            }
        }
    }

    pub async fn remove(&self, scope: StoreScope, key: &str) -> bool {
        match self.store(scope).remove_item(key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(?scope, key, error = %err, "failed to remove from storage");
                false
            }
        }
    }

    /// 両方のストアからキーを削除する
    pub async fn remove_everywhere(&self, key: &str) -> bool {
        let durable = self.remove(StoreScope::Durable, key).await;
        let session = self.remove(StoreScope::Session, key).await;
        durable && session
    }

    pub async fn clear(&self, scope: StoreScope) -> bool {
        match self.store(scope).clear().await {
            Ok(()) => true,
            Err(err) => {
                warn!(?scope, error = %err, "failed to clear storage");
                false
            }
        }
    }

    /// 永続ストアを優先して探し、見つかったスコープと値を返す
    pub async fn find<T: DeserializeOwned>(&self, key: &str) -> Option<(StoreScope, T)> {
        for scope in [StoreScope::Durable, StoreScope::Session] {
            if let Some(value) = self.get(scope, key).await {
                return Some((scope, value));
            }
        }
        None
    }

    /// 読み込み → 変更 → 書き戻し。同一プロセス外との原子性はない
    pub async fn update<T, F>(&self, scope: StoreScope, key: &str, mutate: F) -> bool
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T),
    {
        let mut value: T = self.get(scope, key).await.unwrap_or_default();
        mutate(&mut value);
        self.set(scope, key, &value).await
    }

    pub async fn put_object<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(collection, key, error = %err, "failed to serialize collection object");
                return false;
            }
        };
        match self.collections.put(collection, key, &value).await {
            Ok(()) => true,
            Err(err) => {
                warn!(collection, key, error = %err, "failed to store collection object");
                false
            }
        }
    }

    pub async fn get_object<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Option<T> {
        let value = match self.collections.get(collection, key).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(collection, key, error = %err, "failed to read collection object");
                return None;
            }
        };
        match serde_json::from_value(value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(collection, key, error = %err, "failed to deserialize collection object");
                None
            }
        }
    }

    pub async fn delete_object(&self, collection: &str, key: &str) -> bool {
        match self.collections.delete(collection, key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(collection, key, error = %err, "failed to delete collection object");
                false
            }
        }
    }

    /// 読めない要素は読み飛ばす
    pub async fn list_objects<T: DeserializeOwned>(&self, collection: &str) -> Vec<T> {
        match self.collections.list(collection).await {
            Ok(values) => values
                .into_iter()
                .filter_map(|value| serde_json::from_value(value).ok())
                .collect(),
            Err(err) => {
                warn!(collection, error = %err, "failed to list collection");
                Vec::new()
            }
        }
    }

    pub async fn clear_collection(&self, collection: &str) -> bool {
        match self.collections.clear(collection).await {
            Ok(()) => true,
            Err(err) => {
                warn!(collection, error = %err, "failed to clear collection");
                false
            }
        }
    }
}
