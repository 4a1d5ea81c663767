use crate::domain::entities::UserProfile;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// リフレッシュエンドポイントの応答。`expires_in` は秒
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInGrant {
    pub user: UserProfile,
    #[serde(flatten)]
    pub tokens: TokenGrant,
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<SignInGrant, AppError>;
    /// 認証なしで呼ばれるリフレッシュエンドポイント
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), AppError>;
}
