use crate::application::ports::HttpTransport;
use crate::application::services::request_deduplicator::RequestDeduplicator;
use crate::application::services::token_refresh::TokenRefreshCoordinator;
use crate::domain::entities::{ApiResponse, RequestDescriptor};
use crate::shared::error::{AppError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 重複排除 → トークン取得 → 送信 → 401 時のリフレッシュと一度だけの再送
#[derive(Clone)]
pub struct ApiClient {
    base_url: Arc<str>,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenRefreshCoordinator>,
    dedup: Arc<RequestDeduplicator>,
}

impl ApiClient {
    pub fn new(
        base_url: impl AsRef<str>,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<TokenRefreshCoordinator>,
        dedup: Arc<RequestDeduplicator>,
    ) -> Self {
        Self {
            base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
            transport,
            tokens,
            dedup,
        }
    }

    pub fn deduplicator(&self) -> &Arc<RequestDeduplicator> {
        &self.dedup
    }

    pub fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!("{}/{}", self.base_url, url.trim_start_matches('/'))
    }

    /// 非 2xx は `AppError::Http` になる
    pub async fn send(&self, request: RequestDescriptor) -> Result<ApiResponse> {
        let client = self.clone();
        self.dedup
            .deduplicate(request, move |request, cancel| async move {
                client.execute(request, cancel).await
            })
            .await
    }

    async fn execute(
        &self,
        mut request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<ApiResponse> {
        request.url = self.resolve_url(&request.url);

        let mut used_token = None;
        if !request.skip_auth {
            if let Some(token) = self.tokens.valid_access_token().await? {
                request.set_bearer(&token);
                used_token = Some(token);
            }
        }

        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.send(request.clone(), cancel.clone()).await?;

        if response.is_unauthorized() && !request.skip_auth && !request.retried {
            warn!(url = %request.url, "request unauthorized, refreshing token");
            let token = self
                .tokens
                .refresh_after_unauthorized(used_token.as_deref())
                .await?;
            request.retried = true;
            request.set_bearer(&token);
            let retried = self.transport.send(request, cancel).await?;
            return into_result(retried);
        }

        into_result(response)
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T> {
        self.send(request).await?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch_json(RequestDescriptor::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.fetch_json(RequestDescriptor::post(path, body)).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.fetch_json(RequestDescriptor::put(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(RequestDescriptor::delete(path)).await.map(|_| ())
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse> {
    if response.is_success() {
        return Ok(response);
    }
    let message = response.error_message();
    if response.is_unauthorized() {
        return Err(AppError::Unauthorized(message));
    }
    Err(AppError::http(response.status, message))
}
