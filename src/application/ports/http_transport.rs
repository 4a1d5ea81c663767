use crate::domain::entities::{ApiResponse, RequestDescriptor};
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// 実際のネットワーク呼び出しを行うポート
///
/// HTTP ステータスに関わらずレスポンスが届けば `Ok` を返す。
/// `Err` はネットワーク障害かキャンセルのみ。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<ApiResponse, AppError>;
}
