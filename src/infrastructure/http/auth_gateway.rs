use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{AuthGateway, Credentials, HttpTransport, SignInGrant, TokenGrant};
use crate::domain::constants::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use crate::domain::entities::{ApiResponse, RequestDescriptor};
use crate::shared::AppError;

/// 認証エンドポイントを呼ぶゲートウェイ。トークン付与の仕組みは通さない
pub struct HttpAuthGateway {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl HttpAuthGateway {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, request: RequestDescriptor) -> Result<ApiResponse, AppError> {
        let response = self
            .transport
            .send(request.without_auth(), CancellationToken::new())
            .await?;
        if response.is_success() {
            return Ok(response);
        }
        if response.is_unauthorized() {
            return Err(AppError::Unauthorized(response.error_message()));
        }
        Err(AppError::http(response.status, response.error_message()))
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn sign_in(&self, credentials: &Credentials) -> Result<SignInGrant, AppError> {
        let body = serde_json::to_value(credentials)?;
        self.post(RequestDescriptor::post(self.url(LOGIN_PATH), body))
            .await?
            .json()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        self.post(RequestDescriptor::post(
            self.url(REFRESH_PATH),
            json!({ "refresh_token": refresh_token }),
        ))
        .await?
        .json()
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let mut request = RequestDescriptor::post(self.url(LOGOUT_PATH), json!({}));
        request.set_bearer(access_token);
        self.post(request).await.map(|_| ())
    }
}
