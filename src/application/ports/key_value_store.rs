use crate::shared::error::AppError;
use async_trait::async_trait;

/// キー・バリューストアの寿命
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    /// 再起動後も残る（localStorage 相当）
    Durable,
    /// プロセス／タブの寿命だけ残る（sessionStorage 相当）
    Session,
}

/// 文字列値を保持するキー・バリューストアのポート
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove_item(&self, key: &str) -> Result<(), AppError>;
    async fn keys(&self) -> Result<Vec<String>, AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}
