use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::ports::HttpTransport;
use crate::domain::entities::{ApiResponse, HttpMethod, RequestDescriptor};
use crate::shared::AppError;
use crate::shared::config::ApiConfig;

/// reqwest による HTTP トランスポート
#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let http = builder
            .build()
            .map_err(|err| AppError::ConfigurationError(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { http })
    }

    /// 既存のクライアントを使い回す
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    fn method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }

    async fn dispatch(&self, request: RequestDescriptor) -> Result<ApiResponse, AppError> {
        let mut builder = self
            .http
            .request(Self::method(request.method), &request.url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        debug!(status, url = %request.url, "received response");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<ApiResponse, AppError> {
        let url = request.url.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(url = %url, "request aborted");
                Err(AppError::Cancelled(format!("request to {url} was aborted")))
            }
            result = self.dispatch(request) => result,
        }
    }
}
