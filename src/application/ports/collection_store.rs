use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

/// 名前付きコレクション単位で大きめのオブジェクトを保持するポート
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), AppError>;
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, AppError>;
    async fn delete(&self, collection: &str, key: &str) -> Result<(), AppError>;
    /// 挿入順で返す
    async fn list(&self, collection: &str) -> Result<Vec<Value>, AppError>;
    async fn clear(&self, collection: &str) -> Result<(), AppError>;
}
