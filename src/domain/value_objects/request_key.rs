use crate::domain::entities::RequestDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 重複排除に使うリクエストの決定的なキー
///
/// method + url + params + body をシリアライズして連結する。
/// params は `BTreeMap` なので並び順に依存しない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_descriptor(descriptor: &RequestDescriptor) -> Self {
        let params = serde_json::to_string(&descriptor.params).unwrap_or_default();
        let body = descriptor
            .body
            .as_ref()
            .map(|value| value.to_string())
            .unwrap_or_default();
        Self(format!(
            "{}:{}:{}:{}",
            descriptor.method.as_str(),
            descriptor.url,
            params,
            body
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
