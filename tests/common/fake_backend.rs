use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use careerhub_lib::application::ports::HttpTransport;
use careerhub_lib::domain::entities::{ApiResponse, HttpMethod, RequestDescriptor};
use careerhub_lib::shared::error::AppError;

pub const BASE_URL: &str = "http://api.test";

/// バックエンドが受け取った一回分のリクエスト
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub authorization: Option<String>,
    pub status: u16,
}

struct BackendState {
    valid_token: String,
    refresh_token: String,
    issued: usize,
    refresh_rejected: bool,
    reject_all: bool,
    failing_paths: HashSet<String>,
    saved: Vec<String>,
    calls: Vec<RecordedCall>,
}

/// テスト用の REST バックエンド。トークンを検証し、呼び出しを記録する
pub struct FakeBackend {
    state: Mutex<BackendState>,
    latency: Duration,
    refresh_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                valid_token: "access-0".to_string(),
                refresh_token: "refresh-0".to_string(),
                issued: 0,
                refresh_rejected: false,
                reject_all: false,
                failing_paths: HashSet::new(),
                saved: Vec::new(),
                calls: Vec::new(),
            }),
            latency,
            refresh_calls: AtomicUsize::new(0),
        })
    }

    /// サーバー側でアクセストークンを失効させる
    pub fn rotate_access_token(&self, token: &str) {
        self.state.lock().unwrap().valid_token = token.to_string();
    }

    pub fn reject_refresh(&self) {
        self.state.lock().unwrap().refresh_rejected = true;
    }

    pub fn reject_all_requests(&self) {
        self.state.lock().unwrap().reject_all = true;
    }

    pub fn fail_path(&self, path: &str) {
        self.state.lock().unwrap().failing_paths.insert(path.to_string());
    }

    pub fn saved_on_server(&self) -> Vec<String> {
        self.state.lock().unwrap().saved.clone()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }

    fn issue_tokens(state: &mut BackendState) -> Value {
        state.issued += 1;
        state.valid_token = format!("access-{}", state.issued);
        state.refresh_token = format!("refresh-{}", state.issued);
        json!({
            "access_token": state.valid_token,
            "refresh_token": state.refresh_token,
            "expires_in": 3600
        })
    }

    fn route(&self, request: &RequestDescriptor) -> ApiResponse {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();
        let mut state = self.state.lock().unwrap();

        let response = match (request.method, path.as_str()) {
            (HttpMethod::Post, "/auth/login") => {
                let email = request
                    .body
                    .as_ref()
                    .and_then(|body| body.get("email"))
                    .cloned()
                    .unwrap_or(Value::Null);
                let mut grant = Self::issue_tokens(&mut state);
                grant["user"] = json!({"id": "u1", "email": email});
                ApiResponse::ok(grant)
            }
            (HttpMethod::Post, "/auth/refresh") => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                let presented = request
                    .body
                    .as_ref()
                    .and_then(|body| body.get("refresh_token"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if state.refresh_rejected || presented.as_deref() != Some(state.refresh_token.as_str()) {
                    ApiResponse::new(401, json!({"detail": "refresh token rejected"}))
                } else {
                    ApiResponse::ok(Self::issue_tokens(&mut state))
                }
            }
            _ => {
                let expected = format!("Bearer {}", state.valid_token);
                if state.reject_all || request.header("Authorization") != Some(expected.as_str()) {
                    ApiResponse::new(401, json!({"detail": "invalid token"}))
                } else if state.failing_paths.contains(&path) {
                    ApiResponse::new(500, json!({"detail": "internal error"}))
                } else {
                    Self::authorized_route(&mut state, request, &path)
                }
            }
        };

        state.calls.push(RecordedCall {
            method: request.method,
            path,
            params: request.params.clone(),
            authorization: request.header("Authorization").map(str::to_string),
            status: response.status,
        });
        response
    }

    fn authorized_route(state: &mut BackendState, request: &RequestDescriptor, path: &str) -> ApiResponse {
        if path == "/auth/logout" {
            return ApiResponse::new(204, Value::Null);
        }
        if path == "/jobs" {
            let page: u32 = request
                .params
                .get("page")
                .and_then(|page| page.parse().ok())
                .unwrap_or(1);
            return ApiResponse::ok(json!({
                "items": [
                    {"id": format!("job-{page}-1"), "title": "Rust Engineer", "company": "Ferrous"},
                    {"id": format!("job-{page}-2"), "title": "SRE", "company": "Oxide"}
                ],
                "page": page,
                "total": 40,
                "has_more": page < 20
            }));
        }
        if path == "/jobs/saved" {
            let items: Vec<Value> = state
                .saved
                .iter()
                .map(|id| json!({"id": id, "title": "Saved", "company": "Acme"}))
                .collect();
            return ApiResponse::ok(Value::Array(items));
        }
        if let Some(rest) = path.strip_prefix("/jobs/") {
            if let Some(job_id) = rest.strip_suffix("/save") {
                match request.method {
                    HttpMethod::Post => {
                        if !state.saved.iter().any(|id| id == job_id) {
                            state.saved.push(job_id.to_string());
                        }
                        return ApiResponse::ok(json!({"saved": true}));
                    }
                    HttpMethod::Delete => {
                        state.saved.retain(|id| id != job_id);
                        return ApiResponse::new(204, Value::Null);
                    }
                    _ => {}
                }
            } else {
                return ApiResponse::ok(json!({"id": rest, "title": "Rust Engineer", "company": "Ferrous"}));
            }
        }
        ApiResponse::ok(json!({"path": path}))
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn send(
        &self,
        request: RequestDescriptor,
        cancel: CancellationToken,
    ) -> Result<ApiResponse, AppError> {
        let response = self.route(&request);
        if !self.latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(AppError::Cancelled("aborted by client".into()));
                }
                _ = tokio::time::sleep(self.latency) => {}
            }
        }
        Ok(response)
    }
}
