use crate::application::ports::{AuthGateway, SignInNavigator, StoreScope};
use crate::application::services::storage_service::StorageService;
use crate::domain::constants::{AUTH_STORAGE_KEY, SESSION_DATA_KEY};
use crate::domain::entities::{AuthStateBlob, AuthStatus, SessionData, TokenData, UserProfile};
use crate::shared::clock::Clock;
use crate::shared::config::SessionConfig;
use crate::shared::error::{AppError, Result};
use crate::shared::single_flight::SingleFlight;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// アクセストークンの寿命を管理し、リフレッシュを一本化する
///
/// リフレッシュはコーディネーターが所有するタスクで実行され、開始したリクエストが
/// 取り消されても中断されない。待機中の呼び出しは到着順に同じ結果を受け取る。
/// リフレッシュに失敗した場合はローカルの認証状態を破棄してサインイン画面へ誘導する。
pub struct TokenRefreshCoordinator {
    context: RefreshContext,
    flight: SingleFlight<TokenData>,
}

/// リフレッシュタスクへ渡すハンドル一式
#[derive(Clone)]
struct RefreshContext {
    storage: Arc<StorageService>,
    gateway: Arc<dyn AuthGateway>,
    navigator: Option<Arc<dyn SignInNavigator>>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    status: Arc<watch::Sender<AuthStatus>>,
}

impl TokenRefreshCoordinator {
    pub fn new(
        storage: Arc<StorageService>,
        gateway: Arc<dyn AuthGateway>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let (status, _) = watch::channel(AuthStatus::Unauthenticated);
        Self {
            context: RefreshContext {
                storage,
                gateway,
                navigator: None,
                clock,
                config,
                status: Arc::new(status),
            },
            flight: SingleFlight::new(),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn SignInNavigator>) -> Self {
        self.context.navigator = Some(navigator);
        self
    }

    pub fn status(&self) -> AuthStatus {
        *self.context.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.context.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: AuthStatus) {
        self.context.set_status(status);
    }

    pub fn is_refreshing(&self) -> bool {
        self.flight.is_in_flight()
    }

    /// これまでにリフレッシュエンドポイントを呼んだ回数
    pub fn refresh_count(&self) -> u64 {
        self.flight.flights_started()
    }

    pub async fn auth_state(&self) -> Option<(StoreScope, AuthStateBlob)> {
        self.context.auth_state().await
    }

    pub async fn current_tokens(&self) -> Option<TokenData> {
        self.auth_state().await.and_then(|(_, blob)| blob.tokens)
    }

    /// 認証状態をまとめて一度に書き込む
    pub async fn store_tokens(
        &self,
        scope: StoreScope,
        user: Option<UserProfile>,
        tokens: TokenData,
    ) -> bool {
        self.context.store_tokens(scope, user, tokens).await
    }

    /// 送信前に呼ばれる。期限が近ければ先にリフレッシュする
    ///
    /// トークンがなければ `Ok(None)`。リクエストは認証なしで送られる。
    pub async fn valid_access_token(&self) -> Result<Option<String>> {
        if self.flight.is_in_flight() {
            return self.refresh().await.map(|tokens| Some(tokens.access_token));
        }

        let Some(tokens) = self.current_tokens().await else {
            return Ok(None);
        };

        let now = self.context.clock.now_millis();
        if tokens.expires_within(now, self.context.config.refresh_buffer_millis()) {
            debug!(
                expires_in_ms = tokens.expires_at - now,
                "access token near expiry, refreshing before request"
            );
            return self.refresh().await.map(|tokens| Some(tokens.access_token));
        }

        Ok(Some(tokens.access_token))
    }

    /// 401 を受けた後に呼ばれる
    ///
    /// 失敗したリクエストが使ったトークンが既に更新済みなら、再リフレッシュせずに新しいトークンを返す。
    pub async fn refresh_after_unauthorized(&self, used_token: Option<&str>) -> Result<String> {
        if !self.flight.is_in_flight() {
            if let (Some(used), Some(current)) = (used_token, self.current_tokens().await) {
                if current.access_token != used
                    && !current.is_expired(self.context.clock.now_millis())
                {
                    debug!("token already rotated by an earlier refresh, retrying with it");
                    return Ok(current.access_token);
                }
            }
        }
        self.refresh().await.map(|tokens| tokens.access_token)
    }

    /// 実行中のリフレッシュがあればその結果を待ち、なければ開始する
    pub async fn refresh(&self) -> Result<TokenData> {
        let context = self.context.clone();
        self.flight
            .run(move || async move { context.perform_refresh().await })
            .await
    }

    /// ローカルの認証状態を破棄し、期限切れとしてサインイン画面へ誘導する
    pub async fn expire(&self) {
        self.context.expire().await;
    }

    pub async fn clear_local_state(&self) {
        self.context.clear_local_state().await;
    }
}

impl RefreshContext {
    fn set_status(&self, status: AuthStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!(?previous, current = ?status, "auth status changed");
        }
    }

    async fn auth_state(&self) -> Option<(StoreScope, AuthStateBlob)> {
        self.storage.find::<AuthStateBlob>(AUTH_STORAGE_KEY).await
    }

    async fn store_tokens(
        &self,
        scope: StoreScope,
        user: Option<UserProfile>,
        tokens: TokenData,
    ) -> bool {
        let blob = AuthStateBlob {
            user,
            tokens: Some(tokens),
            is_authenticated: true,
        };
        self.storage.set(scope, AUTH_STORAGE_KEY, &blob).await
    }

    async fn perform_refresh(&self) -> Result<TokenData> {
        let previous = self.status.send_replace(AuthStatus::Refreshing);
        let _reset = RefreshingStatusGuard {
            status: Arc::clone(&self.status),
            previous,
        };

        let Some((scope, blob)) = self.auth_state().await else {
            return Err(self.fail_refresh(AppError::SessionExpired).await);
        };
        let Some(refresh_token) = blob.tokens.as_ref().map(|tokens| tokens.refresh_token.clone())
        else {
            return Err(self.fail_refresh(AppError::SessionExpired).await);
        };

        info!(?scope, "refreshing access token");
        match self.gateway.refresh(&refresh_token).await {
            Ok(grant) => {
                let now = self.clock.now_millis();
                let tokens = TokenData::from_expires_in(
                    grant.access_token,
                    grant.refresh_token,
                    grant.expires_in,
                    now,
                );
                if !self.store_tokens(scope, blob.user, tokens.clone()).await {
                    warn!(?scope, "refreshed tokens could not be persisted");
                }
                self.renew_session(now).await;
                self.set_status(AuthStatus::Authenticated);
                info!(expires_at = tokens.expires_at, "access token refreshed");
                Ok(tokens)
            }
            Err(err) => Err(self.fail_refresh(err).await),
        }
    }

    async fn fail_refresh(&self, err: AppError) -> AppError {
        error!(error = %err, "token refresh failed, clearing session");
        self.expire().await;
        err
    }

    /// 在席中のユーザーのセッションだけを延長する。remember-me は延長しない
    async fn renew_session(&self, now: i64) {
        let Some((scope, mut session)) = self.storage.find::<SessionData>(SESSION_DATA_KEY).await
        else {
            return;
        };
        if session.remember_me || !session.is_active(now, self.config.idle_window_millis()) {
            return;
        }
        let renewed = now + self.config.default_timeout_millis();
        if renewed > session.expires_at {
            session.expires_at = renewed;
            self.storage.set(scope, SESSION_DATA_KEY, &session).await;
        }
    }

    async fn expire(&self) {
        self.clear_local_state().await;
        self.set_status(AuthStatus::Expired);
        self.redirect_to_sign_in();
    }

    async fn clear_local_state(&self) {
        self.storage.remove_everywhere(AUTH_STORAGE_KEY).await;
        self.storage.remove_everywhere(SESSION_DATA_KEY).await;
    }

    fn redirect_to_sign_in(&self) {
        let Some(navigator) = &self.navigator else {
            return;
        };
        let target = self.config.sign_in_path.as_str();
        if navigator.current_path().as_deref() == Some(target) {
            return;
        }
        info!(target, "redirecting to sign-in");
        navigator.redirect_to(target);
    }
}

/// リフレッシュが結果を出さずに終わった場合に `Refreshing` を元へ戻す
struct RefreshingStatusGuard {
    status: Arc<watch::Sender<AuthStatus>>,
    previous: AuthStatus,
}

impl Drop for RefreshingStatusGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        self.status.send_if_modified(|current| {
            if *current == AuthStatus::Refreshing {
                *current = previous;
                true
            } else {
                false
            }
        });
    }
}
