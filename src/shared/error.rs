use thiserror::Error;

/// アプリケーション共通のエラー
///
/// 共有された結果を複数の呼び出し元へそのまま返せるように `Clone` を実装する。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        AppError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppError::Http { status, .. } => Some(*status),
            AppError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            AppError::DeserializationError(err.to_string())
        } else {
            AppError::SerializationError(err.to_string())
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return AppError::http(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return AppError::DeserializationError(err.to_string());
        }
        AppError::Network(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_detected_from_http_status() {
        assert!(AppError::http(401, "token expired").is_unauthorized());
        assert!(AppError::Unauthorized("missing token".into()).is_unauthorized());
        assert!(!AppError::http(500, "boom").is_unauthorized());
        assert!(!AppError::Network("offline".into()).is_unauthorized());
    }

    #[test]
    fn json_syntax_errors_map_to_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(
            AppError::from(err),
            AppError::DeserializationError(_)
        ));
    }
}
