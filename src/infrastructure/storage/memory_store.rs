use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::ports::KeyValueStore;
use crate::shared::AppError;

/// プロセスの寿命だけ値を保持するセッションストア
#[derive(Default)]
pub struct MemoryKeyValueStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), AppError> {
        self.items.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, AppError> {
        let mut keys: Vec<String> = self.items.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.items.write().await.clear();
        Ok(())
    }
}
