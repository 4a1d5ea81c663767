use crate::application::ports::{AuthGateway, Credentials, StoreScope};
use crate::application::services::storage_service::StorageService;
use crate::application::services::token_refresh::TokenRefreshCoordinator;
use crate::domain::constants::SESSION_DATA_KEY;
use crate::domain::entities::{ActivityKind, AuthStatus, SessionData, TokenData};
use crate::shared::clock::Clock;
use crate::shared::config::SessionConfig;
use crate::shared::error::{AppError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 定期チェックの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    NoSession,
    Active { remaining_millis: i64 },
    Refreshed,
    Expired,
}

/// サインインからサインアウトまでのセッションの寿命を管理する
///
/// remember-me のセッションは永続ストアに長い期限で保存され、操作では延長されない。
/// それ以外はセッションストアに短い期限で保存され、操作のたびに延長される。
pub struct SessionService {
    storage: Arc<StorageService>,
    gateway: Arc<dyn AuthGateway>,
    tokens: Arc<TokenRefreshCoordinator>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
}

impl SessionService {
    pub fn new(
        storage: Arc<StorageService>,
        gateway: Arc<dyn AuthGateway>,
        tokens: Arc<TokenRefreshCoordinator>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            storage,
            gateway,
            tokens,
            clock,
            config,
        }
    }

    fn scope_for(remember_me: bool) -> StoreScope {
        if remember_me {
            StoreScope::Durable
        } else {
            StoreScope::Session
        }
    }

    fn timeout_for(&self, remember_me: bool) -> i64 {
        if remember_me {
            self.config.remember_me_millis()
        } else {
            self.config.default_timeout_millis()
        }
    }

    pub fn status(&self) -> AuthStatus {
        self.tokens.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.tokens.subscribe()
    }

    pub async fn sign_in(&self, credentials: &Credentials, remember_me: bool) -> Result<SessionData> {
        let grant = self.gateway.sign_in(credentials).await?;
        let now = self.clock.now_millis();
        let scope = Self::scope_for(remember_me);

        // 別スコープに残った古いセッションを消す
        self.tokens.clear_local_state().await;

        let tokens = TokenData::from_expires_in(
            grant.tokens.access_token,
            grant.tokens.refresh_token,
            grant.tokens.expires_in,
            now,
        );
        let session = SessionData::new(grant.user.clone(), remember_me, self.timeout_for(remember_me), now);

        let persisted = self.tokens.store_tokens(scope, Some(grant.user), tokens).await
            && self.storage.set(scope, SESSION_DATA_KEY, &session).await;
        if !persisted {
            self.tokens.clear_local_state().await;
            return Err(AppError::Storage("failed to persist session".to_string()));
        }

        self.tokens.set_status(AuthStatus::Authenticated);
        info!(
            user_id = %session.user.id,
            device_id = %session.device_id,
            remember_me,
            expires_at = session.expires_at,
            "signed in"
        );
        Ok(session)
    }

    /// 起動時に保存済みのセッションを読み戻す。期限切れなら破棄する
    pub async fn restore(&self) -> Option<SessionData> {
        let Some((scope, session)) = self.current_session().await else {
            self.tokens.set_status(AuthStatus::Unauthenticated);
            return None;
        };

        if session.is_expired(self.clock.now_millis()) || self.tokens.current_tokens().await.is_none() {
            info!(?scope, "discarding expired persisted session");
            self.tokens.clear_local_state().await;
            self.tokens.set_status(AuthStatus::Unauthenticated);
            return None;
        }

        self.tokens.set_status(AuthStatus::Authenticated);
        debug!(?scope, user_id = %session.user.id, "restored session");
        Some(session)
    }

    pub async fn current_session(&self) -> Option<(StoreScope, SessionData)> {
        self.storage.find::<SessionData>(SESSION_DATA_KEY).await
    }

    /// 操作を記録する。期限切れのセッションは延長しない
    pub async fn record_activity(&self, kind: ActivityKind) -> bool {
        let Some((scope, mut session)) = self.current_session().await else {
            return false;
        };
        let now = self.clock.now_millis();
        if session.is_expired(now) {
            return false;
        }

        session.touch(now, self.timeout_for(session.remember_me));
        let stored = self.storage.set(scope, SESSION_DATA_KEY, &session).await;
        debug!(?kind, expires_at = session.expires_at, "recorded activity");
        stored
    }

    /// 定期チェック。期限切れなら破棄し、トークンの期限が近ければリフレッシュする
    pub async fn check_expiry(&self) -> SessionCheck {
        let Some((_, session)) = self.current_session().await else {
            return SessionCheck::NoSession;
        };
        let now = self.clock.now_millis();

        if session.is_expired(now) {
            info!(user_id = %session.user.id, "session expired");
            self.tokens.expire().await;
            return SessionCheck::Expired;
        }

        let needs_refresh = match self.tokens.current_tokens().await {
            Some(tokens) => tokens.expires_within(now, self.config.refresh_buffer_millis()),
            None => true,
        };
        if !needs_refresh {
            return SessionCheck::Active {
                remaining_millis: session.remaining_millis(now),
            };
        }

        match self.tokens.refresh().await {
            Ok(_) => SessionCheck::Refreshed,
            Err(err) => {
                warn!(error = %err, "scheduled token refresh failed");
                SessionCheck::Expired
            }
        }
    }

    /// 在席判定。有効期限とは独立
    pub async fn is_active(&self) -> bool {
        match self.current_session().await {
            Some((_, session)) => {
                session.is_active(self.clock.now_millis(), self.config.idle_window_millis())
            }
            None => false,
        }
    }

    pub async fn time_until_expiry(&self) -> Option<i64> {
        self.current_session()
            .await
            .map(|(_, session)| session.remaining_millis(self.clock.now_millis()))
    }

    /// サーバーへの通知は失敗しても続行する
    pub async fn sign_out(&self) {
        if let Some(tokens) = self.tokens.current_tokens().await {
            if let Err(err) = self.gateway.sign_out(&tokens.access_token).await {
                warn!(error = %err, "sign-out request failed, clearing local session anyway");
            }
        }
        self.tokens.clear_local_state().await;
        self.tokens.set_status(AuthStatus::Unauthenticated);
        info!("signed out");
    }
}
