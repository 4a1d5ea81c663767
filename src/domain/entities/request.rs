use crate::shared::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 送信前のリクエスト記述子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// サインイン・リフレッシュなどトークンを付与しないリクエスト
    #[serde(default)]
    pub skip_auth: bool,
    /// 401 後の再送済みフラグ。再送は一度だけ
    #[serde(default)]
    pub retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            body: None,
            headers: BTreeMap::new(),
            skip_auth: false,
            retried: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, url).with_body(body)
    }

    pub fn put(url: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, url).with_body(body)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn without_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// ヘッダー名は大文字小文字を区別しない
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn header_flag(&self, name: &str) -> bool {
        self.header(name)
            .map(|value| {
                let value = value.trim();
                value.eq_ignore_ascii_case("true") || value == "1"
            })
            .unwrap_or(false)
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    }

    pub fn set_bearer(&mut self, access_token: &str) {
        self.remove_header(crate::domain::constants::AUTHORIZATION_HEADER);
        self.headers.insert(
            crate::domain::constants::AUTHORIZATION_HEADER.to_string(),
            format!("Bearer {access_token}"),
        );
    }
}

/// トランスポートから返るレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.body.clone()).map_err(AppError::from)
    }

    /// 非 2xx のレスポンスをエラーへ変換する
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .or_else(|| self.body.get("detail"))
            .or_else(|| self.body.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", self.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = RequestDescriptor::get("/jobs").with_header("x-no-dedupe", "TRUE");
        assert!(request.header_flag("X-No-Dedupe"));
        assert!(!request.header_flag("X-Dedupe"));
    }

    #[test]
    fn set_bearer_replaces_existing_authorization() {
        let mut request = RequestDescriptor::get("/me").with_header("authorization", "Bearer old");
        request.set_bearer("new");
        assert_eq!(request.header("Authorization"), Some("Bearer new"));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn error_message_prefers_server_message() {
        let response = ApiResponse::new(422, json!({"detail": "email already used"}));
        assert_eq!(response.error_message(), "email already used");
        let bare = ApiResponse::new(500, Value::Null);
        assert_eq!(bare.error_message(), "request failed with status 500");
    }
}
