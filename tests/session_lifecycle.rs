mod common;

use std::time::Duration;

use careerhub_lib::application::ports::{Credentials, StoreScope};
use careerhub_lib::application::services::SessionCheck;
use careerhub_lib::domain::constants::{AUTH_STORAGE_KEY, SESSION_DATA_KEY};
use careerhub_lib::domain::entities::{ActivityKind, AuthStateBlob, AuthStatus, SessionData};

use common::{START_MILLIS, TestApp, build_app, reload, test_config};

const MINUTE: i64 = 60_000;
const DAY: i64 = 24 * 60 * MINUTE;

fn credentials() -> Credentials {
    Credentials::new("ada@example.com", "pw")
}

async fn signed_in(remember_me: bool) -> (TestApp, SessionData) {
    let app = build_app(test_config(), Duration::ZERO);
    let session = app
        .state
        .sessions
        .sign_in(&credentials(), remember_me)
        .await
        .expect("sign in");
    (app, session)
}

async fn stored_session(app: &TestApp, scope: StoreScope) -> Option<SessionData> {
    app.state.storage.get(scope, SESSION_DATA_KEY).await
}

#[tokio::test]
async fn remember_me_session_is_durable_for_thirty_days() {
    let (app, session) = signed_in(true).await;

    assert!(session.remember_me);
    assert_eq!(session.expires_at, START_MILLIS + 30 * DAY);
    assert_eq!(session.user.email, "ada@example.com");
    assert_eq!(stored_session(&app, StoreScope::Durable).await, Some(session.clone()));
    assert_eq!(stored_session(&app, StoreScope::Session).await, None);

    let blob: AuthStateBlob = app
        .state
        .storage
        .get(StoreScope::Durable, AUTH_STORAGE_KEY)
        .await
        .expect("auth blob");
    assert!(blob.is_authenticated);
    assert_eq!(blob.tokens.expect("tokens").access_token, "access-1");
    assert_eq!(app.state.sessions.status(), AuthStatus::Authenticated);
}

#[tokio::test]
async fn remember_me_expiry_does_not_slide_with_activity() {
    let (app, session) = signed_in(true).await;

    app.clock.advance_millis(10 * MINUTE);
    assert!(app.state.sessions.record_activity(ActivityKind::KeyDown).await);

    let (_, touched) = app.state.sessions.current_session().await.expect("session");
    assert_eq!(touched.expires_at, session.expires_at);
    assert_eq!(touched.last_activity, START_MILLIS + 10 * MINUTE);
}

#[tokio::test]
async fn remember_me_session_survives_reload() {
    let (app, session) = signed_in(true).await;
    app.clock.advance_millis(2 * DAY);

    let reloaded = reload(&app, test_config());
    let restored = reloaded.state.restore().await.expect("restored session");

    assert_eq!(restored, session);
    assert_eq!(reloaded.state.sessions.status(), AuthStatus::Authenticated);
    assert!(reloaded.state.tokens.current_tokens().await.is_some());
}

#[tokio::test]
async fn expired_remember_me_session_is_discarded_on_reload() {
    let (app, _) = signed_in(true).await;
    app.clock.advance_millis(31 * DAY);

    let reloaded = reload(&app, test_config());
    assert_eq!(reloaded.state.restore().await, None);
    assert_eq!(reloaded.state.sessions.status(), AuthStatus::Unauthenticated);
    assert!(reloaded.state.storage.find::<SessionData>(SESSION_DATA_KEY).await.is_none());
    assert!(reloaded.state.tokens.auth_state().await.is_none());
}

#[tokio::test]
async fn plain_session_lives_in_session_store_and_slides() {
    let (app, session) = signed_in(false).await;

    assert!(!session.remember_me);
    assert_eq!(session.expires_at, START_MILLIS + 30 * MINUTE);
    assert_eq!(stored_session(&app, StoreScope::Session).await, Some(session.clone()));
    assert_eq!(stored_session(&app, StoreScope::Durable).await, None);
    assert_eq!(app.state.tokens.auth_state().await.map(|(scope, _)| scope), Some(StoreScope::Session));

    app.clock.advance_millis(20 * MINUTE);
    assert!(app.state.sessions.record_activity(ActivityKind::PointerDown).await);

    let (_, touched) = app.state.sessions.current_session().await.expect("session");
    assert_eq!(touched.expires_at, START_MILLIS + 50 * MINUTE);
    assert_eq!(app.state.sessions.time_until_expiry().await, Some(30 * MINUTE));
}

#[tokio::test]
async fn plain_session_does_not_survive_reload() {
    let (app, _) = signed_in(false).await;

    let reloaded = reload(&app, test_config());
    assert_eq!(reloaded.state.restore().await, None);
    assert_eq!(reloaded.state.sessions.status(), AuthStatus::Unauthenticated);
}

#[tokio::test]
async fn activity_after_expiry_does_not_revive_session() {
    let (app, _) = signed_in(false).await;
    app.clock.advance_millis(31 * MINUTE);

    assert!(!app.state.sessions.record_activity(ActivityKind::Scroll).await);
}

#[tokio::test]
async fn expiry_check_clears_expired_session_and_redirects() {
    let (app, _) = signed_in(false).await;
    app.clock.advance_millis(30 * MINUTE);

    assert_eq!(app.state.sessions.check_expiry().await, SessionCheck::Expired);
    assert!(app.state.sessions.current_session().await.is_none());
    assert!(app.state.tokens.current_tokens().await.is_none());
    assert_eq!(app.state.sessions.status(), AuthStatus::Expired);
    assert_eq!(app.state.navigator.subscribe().borrow().as_str(), "/login");

    assert_eq!(app.state.sessions.check_expiry().await, SessionCheck::NoSession);
}

#[tokio::test]
async fn expiry_check_refreshes_tokens_close_to_expiry() {
    let (app, _) = signed_in(true).await;

    app.clock.advance_millis(10 * MINUTE);
    assert_eq!(
        app.state.sessions.check_expiry().await,
        SessionCheck::Active {
            remaining_millis: 30 * DAY - 10 * MINUTE
        }
    );
    assert_eq!(app.backend.refresh_calls(), 0);

    // アクセストークンは 60 分で失効し、残り 5 分を切ったら更新する
    app.clock.advance_millis(46 * MINUTE);
    assert_eq!(app.state.sessions.check_expiry().await, SessionCheck::Refreshed);
    assert_eq!(app.backend.refresh_calls(), 1);
    assert_eq!(
        app.state.tokens.current_tokens().await.expect("tokens").access_token,
        "access-2"
    );
}

#[tokio::test]
async fn presence_follows_idle_window() {
    let (app, _) = signed_in(false).await;
    assert!(app.state.sessions.is_active().await);

    app.clock.advance_millis(6 * MINUTE);
    assert!(!app.state.sessions.is_active().await);

    app.state.sessions.record_activity(ActivityKind::TouchStart).await;
    assert!(app.state.sessions.is_active().await);
}

#[tokio::test]
async fn signing_in_again_replaces_session_in_other_scope() {
    let (app, _) = signed_in(true).await;

    app.state
        .sessions
        .sign_in(&credentials(), false)
        .await
        .expect("second sign in");

    assert_eq!(stored_session(&app, StoreScope::Durable).await, None);
    assert!(stored_session(&app, StoreScope::Session).await.is_some());
    let (scope, blob) = app.state.tokens.auth_state().await.expect("auth state");
    assert_eq!(scope, StoreScope::Session);
    assert_eq!(blob.tokens.expect("tokens").access_token, "access-2");
}

#[tokio::test]
async fn sign_out_notifies_backend_and_clears_local_state() {
    let (app, _) = signed_in(true).await;

    app.state.sign_out().await;

    let logout = app.backend.calls_to("/auth/logout");
    assert_eq!(logout.len(), 1);
    assert_eq!(logout[0].authorization.as_deref(), Some("Bearer access-1"));
    assert!(app.state.sessions.current_session().await.is_none());
    assert!(app.state.tokens.auth_state().await.is_none());
    assert_eq!(app.state.sessions.status(), AuthStatus::Unauthenticated);
}

#[tokio::test]
async fn sign_out_clears_local_state_when_backend_rejects() {
    let (app, _) = signed_in(false).await;
    app.backend.reject_all_requests();

    app.state.sessions.sign_out().await;

    assert_eq!(app.backend.calls_to("/auth/logout")[0].status, 401);
    assert!(app.state.sessions.current_session().await.is_none());
    assert_eq!(app.state.sessions.status(), AuthStatus::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn background_monitor_expires_idle_session() {
    let (app, _) = signed_in(false).await;
    app.state.start_background_jobs().await;
    app.state.start_background_jobs().await;
    assert_eq!(app.state.background_job_count().await, 2);

    app.clock.advance_millis(31 * MINUTE);
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(app.state.sessions.current_session().await.is_none());
    assert_eq!(app.state.sessions.status(), AuthStatus::Expired);

    app.state.shutdown().await;
    assert_eq!(app.state.background_job_count().await, 0);
}
