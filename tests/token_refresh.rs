mod common;

use std::time::Duration;

use futures::future::join_all;

use careerhub_lib::application::ports::Credentials;
use careerhub_lib::domain::entities::{AuthStatus, RequestDescriptor};
use careerhub_lib::shared::error::AppError;

use common::{TestApp, build_app, test_config};

const LATENCY: Duration = Duration::from_millis(30);
/// 発行から 56 分 40 秒後。アクセストークンの残りは 3 分 20 秒
const NEAR_EXPIRY_MILLIS: i64 = 3_400_000;

async fn signed_in_app() -> TestApp {
    let app = build_app(test_config(), LATENCY);
    app.state
        .sessions
        .sign_in(&Credentials::new("ada@example.com", "pw"), true)
        .await
        .expect("sign in");
    app
}

async fn send_three(app: &TestApp) -> Vec<careerhub_lib::Result<serde_json::Value>> {
    let requests = ["/me/a", "/me/b", "/me/c"].map(|path| {
        let api = app.state.api.clone();
        async move { api.send(RequestDescriptor::get(path)).await.map(|response| response.body) }
    });
    join_all(requests).await
}

fn successful_paths(app: &TestApp) -> Vec<String> {
    app.backend
        .calls()
        .into_iter()
        .filter(|call| call.path.starts_with("/me/") && call.status == 200)
        .map(|call| call.path)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn queued_requests_share_one_refresh_before_sending() {
    let app = signed_in_app().await;
    app.clock.advance_millis(NEAR_EXPIRY_MILLIS);

    let results = send_three(&app).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(app.backend.refresh_calls(), 1);
    assert_eq!(app.state.tokens.refresh_count(), 1);
    assert_eq!(successful_paths(&app), vec!["/me/a", "/me/b", "/me/c"]);
    assert!(app
        .backend
        .calls()
        .iter()
        .filter(|call| call.path.starts_with("/me/"))
        .all(|call| call.authorization.as_deref() == Some("Bearer access-2")));

    assert_eq!(app.state.tokens.status(), AuthStatus::Authenticated);
    assert!(!app.state.tokens.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn rejected_requests_are_retried_once_after_a_single_refresh() {
    let app = signed_in_app().await;
    app.backend.rotate_access_token("issued-elsewhere");

    let results = send_three(&app).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(app.backend.refresh_calls(), 1);
    for path in ["/me/a", "/me/b", "/me/c"] {
        let statuses: Vec<u16> = app
            .backend
            .calls_to(path)
            .iter()
            .map(|call| call.status)
            .collect();
        assert_eq!(statuses, vec![401, 200], "{path}");
    }

    let tokens = app.state.tokens.current_tokens().await.expect("tokens");
    assert_eq!(tokens.access_token, "access-2");
    assert_eq!(tokens.refresh_token, "refresh-2");
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_rejects_every_queued_request_and_redirects() {
    let app = signed_in_app().await;
    app.backend.reject_refresh();
    app.clock.advance_millis(NEAR_EXPIRY_MILLIS);
    let mut path = app.state.navigator.subscribe();

    let results = send_three(&app).await;

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(
            result,
            &Err(AppError::Unauthorized("refresh token rejected".into()))
        );
    }
    assert_eq!(app.backend.refresh_calls(), 1);
    assert!(successful_paths(&app).is_empty());

    assert!(path.has_changed().expect("navigator alive"));
    assert_eq!(path.borrow_and_update().as_str(), "/login");
    assert_eq!(app.state.navigator.redirect_count(), 1);
    assert_eq!(app.state.tokens.status(), AuthStatus::Expired);
    assert!(app.state.tokens.current_tokens().await.is_none());
    assert!(app.state.sessions.current_session().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn second_unauthorized_response_is_not_retried_again() {
    let app = signed_in_app().await;
    app.backend.reject_all_requests();

    let result = app.state.api.send(RequestDescriptor::get("/me")).await;

    assert_eq!(result, Err(AppError::Unauthorized("invalid token".into())));
    assert_eq!(app.backend.calls_to("/me").len(), 2);
    assert_eq!(app.backend.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_without_session_expires_and_redirects() {
    let app = build_app(test_config(), LATENCY);

    let result = app.state.api.send(RequestDescriptor::get("/me")).await;

    assert_eq!(result, Err(AppError::SessionExpired));
    let calls = app.backend.calls_to("/me");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].authorization, None);
    assert_eq!(app.backend.refresh_calls(), 0);
    assert_eq!(app.state.navigator.subscribe().borrow().as_str(), "/login");
}

#[tokio::test(start_paused = true)]
async fn no_redirect_when_already_on_sign_in_page() {
    let app = build_app(test_config(), LATENCY);
    app.state.navigator.set_path("/login");

    let result = app.state.api.send(RequestDescriptor::get("/me")).await;

    assert_eq!(result, Err(AppError::SessionExpired));
    assert_eq!(app.state.navigator.redirect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn auth_endpoints_skip_token_attachment() {
    let app = signed_in_app().await;
    app.clock.advance_millis(NEAR_EXPIRY_MILLIS);

    app.state.tokens.refresh().await.expect("refresh");

    let refresh = app.backend.calls_to("/auth/refresh");
    assert_eq!(refresh.len(), 1);
    assert_eq!(refresh[0].authorization, None);
    assert_eq!(refresh[0].status, 200);
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_request_that_started_a_refresh_keeps_it_running() {
    let app = signed_in_app().await;
    app.clock.advance_millis(NEAR_EXPIRY_MILLIS);
    let first_request = RequestDescriptor::get("/me/a");

    let first = {
        let api = app.state.api.clone();
        let request = first_request.clone();
        tokio::spawn(async move { api.send(request).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(app.state.tokens.is_refreshing());

    let queued = {
        let api = app.state.api.clone();
        tokio::spawn(async move {
            api.send(RequestDescriptor::post("/me/b", serde_json::json!({ "n": 1 })))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(app.state.deduplicator.cancel_request(&first_request));

    let first = first.await.expect("first task");
    assert!(matches!(first, Err(AppError::Cancelled(_))));
    let queued = queued.await.expect("queued task");
    assert!(queued.is_ok(), "{queued:?}");

    assert_eq!(app.backend.refresh_calls(), 1);
    assert_eq!(app.state.tokens.status(), AuthStatus::Authenticated);
    assert!(!app.state.tokens.is_refreshing());
    let tokens = app.state.tokens.current_tokens().await.expect("tokens");
    assert_eq!(tokens.refresh_token, "refresh-2");

    let next = app.state.api.send(RequestDescriptor::get("/me/c")).await;
    assert!(next.is_ok(), "{next:?}");
    assert_eq!(app.backend.refresh_calls(), 1);
    assert!(app.state.sessions.current_session().await.is_some());
}
