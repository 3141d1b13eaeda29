// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against a mock auth service over real HTTP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use dz_session::codec::decode_expiry;
use dz_session::event::{LogoutReason, SessionEvent};
use dz_session::manager::{SessionManager, SessionOptions};
use dz_session::store::{TokenPair, TokenStore};
use dz_session::test_support::{mint_token, now_ms, RecordingNavigator};
use dz_session::transport::{HttpTransport, ReqwestTransport};

/// How the mock answers `/auth/refresh-token`.
#[derive(Clone, Copy)]
enum RefreshMode {
    /// 200 with a token expiring 900 s from now.
    Issue,
    /// 401.
    Reject,
}

#[derive(Clone)]
struct MockAuth {
    mode: RefreshMode,
    refresh_calls: Arc<AtomicU32>,
    refresh_bodies: Arc<Mutex<Vec<Value>>>,
    logout_auth: Arc<Mutex<Vec<String>>>,
}

async fn refresh(State(auth): State<MockAuth>, Json(body): Json<Value>) -> (StatusCode, String) {
    auth.refresh_calls.fetch_add(1, Ordering::SeqCst);
    auth.refresh_bodies.lock().push(body);
    match auth.mode {
        RefreshMode::Issue => {
            let token = mint_token(now_ms() / 1000 + 900);
            (StatusCode::OK, json!({ "accessToken": token }).to_string())
        }
        RefreshMode::Reject => {
            (StatusCode::UNAUTHORIZED, json!({ "message": "Invalid refresh token" }).to_string())
        }
    }
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] != "hunter2" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "accessToken": mint_token(now_ms() / 1000 + 3600),
            "refreshToken": "r-login",
            "user": { "_id": "u1", "name": "Ana", "email": body["email"], "role": "admin" },
        })),
    )
}

async fn logout(State(auth): State<MockAuth>, headers: HeaderMap) -> StatusCode {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    auth.logout_auth.lock().push(bearer);
    StatusCode::OK
}

async fn profile(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "message": "No token" })));
    }
    (StatusCode::OK, Json(json!({ "user": { "id": "u1", "name": "Ana", "email": "ana@example.com" } })))
}

async fn update_me() -> Json<Value> {
    Json(json!({ "message": "updated", "accessToken": "a-rotated", "refreshToken": "r-rotated" }))
}

async fn mock_auth_server(mode: RefreshMode) -> anyhow::Result<(SocketAddr, MockAuth)> {
    let auth = MockAuth {
        mode,
        refresh_calls: Arc::new(AtomicU32::new(0)),
        refresh_bodies: Arc::new(Mutex::new(Vec::new())),
        logout_auth: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/api/auth/refresh-token", post(refresh))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/profile", get(profile))
        .route("/api/users/me", put(update_me))
        .with_state(auth.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, auth))
}

fn start(addr: SocketAddr, store: Arc<TokenStore>, nav: Arc<RecordingNavigator>) -> SessionManager {
    let mut options = SessionOptions::new(format!("http://{addr}/api"));
    options.monitor.period = Duration::from_secs(3600);
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(5))) as Arc<dyn HttpTransport>;
    SessionManager::start(options, store, transport, nav)
}

async fn wait_for_first_check(manager: &SessionManager, calls: &AtomicU32) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while calls.load(Ordering::SeqCst) == 0 || manager.monitor().is_checking() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn expiring_token_is_refreshed_on_first_tick() -> anyhow::Result<()> {
    let (addr, auth) = mock_auth_server(RefreshMode::Issue).await?;
    let store = Arc::new(TokenStore::in_memory());
    store.set_tokens(&TokenPair {
        access_token: mint_token(now_ms() / 1000 + 30),
        refresh_token: "r1".to_owned(),
    })?;
    let nav = RecordingNavigator::new();
    let manager = start(addr, Arc::clone(&store), nav.clone());

    wait_for_first_check(&manager, &auth.refresh_calls).await?;

    let access = store.tokens().map(|t| t.access_token).unwrap_or_default();
    assert!(decode_expiry(&access)? >= now_ms() + 890_000);
    assert_eq!(store.tokens().map(|t| t.refresh_token).as_deref(), Some("r1"));
    assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(auth.refresh_bodies.lock()[0], json!({ "refreshToken": "r1" }));
    assert!(nav.visits().is_empty());
    Ok(())
}

#[tokio::test]
async fn fresh_token_is_left_alone() -> anyhow::Result<()> {
    let (addr, auth) = mock_auth_server(RefreshMode::Issue).await?;
    let store = Arc::new(TokenStore::in_memory());
    let access = mint_token(now_ms() / 1000 + 3600);
    store.set_tokens(&TokenPair { access_token: access.clone(), refresh_token: "r1".to_owned() })?;
    let manager = start(addr, Arc::clone(&store), RecordingNavigator::new());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(auth.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.tokens().map(|t| t.access_token), Some(access));
    manager.shutdown();
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_token_ends_session() -> anyhow::Result<()> {
    let (addr, auth) = mock_auth_server(RefreshMode::Reject).await?;
    let store = Arc::new(TokenStore::in_memory());
    store.set_tokens(&TokenPair {
        access_token: mint_token(now_ms() / 1000 - 5),
        refresh_token: "r-revoked".to_owned(),
    })?;
    let nav = RecordingNavigator::new();
    let manager = start(addr, Arc::clone(&store), nav.clone());
    let mut events = manager.subscribe();

    wait_for_first_check(&manager, &auth.refresh_calls).await?;

    assert!(!store.has_session());
    assert_eq!(nav.visits(), vec!["/login".to_owned()]);

    let mut logged_out = false;
    while let Ok(event) = events.try_recv() {
        logged_out |=
            matches!(event, SessionEvent::LoggedOut { reason: LogoutReason::RefreshRejected });
    }
    assert!(logged_out);
    Ok(())
}

#[tokio::test]
async fn unreachable_auth_service_keeps_session() -> anyhow::Result<()> {
    // Bind and drop a listener so the port is closed.
    let addr = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    let store = Arc::new(TokenStore::in_memory());
    let pair = TokenPair { access_token: mint_token(now_ms() / 1000), refresh_token: "r1".to_owned() };
    store.set_tokens(&pair)?;
    let nav = RecordingNavigator::new();
    let manager = start(addr, Arc::clone(&store), nav.clone());
    let mut events = manager.subscribe();

    let failed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(SessionEvent::RefreshFailed { .. }) = events.recv().await {
                return;
            }
        }
    })
    .await;
    assert!(failed.is_ok());
    assert_eq!(store.tokens(), Some(pair));
    assert!(nav.visits().is_empty());
    Ok(())
}

#[tokio::test]
async fn login_then_api_rotation_then_logout() -> anyhow::Result<()> {
    let (addr, auth) = mock_auth_server(RefreshMode::Issue).await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");
    let store = Arc::new(TokenStore::open(&path)?);
    let nav = RecordingNavigator::new();
    let manager = start(addr, Arc::clone(&store), nav.clone());

    assert!(manager.login("ana@example.com", "wrong").await.is_err());
    assert!(!store.has_session());

    let resp = manager.login("ana@example.com", "hunter2").await?;
    assert_eq!(resp.user.as_ref().map(|u| u.id.as_str()), Some("u1"));
    assert!(TokenStore::open(&path)?.has_session());

    let profile = manager.api().profile().await?;
    assert_eq!(profile.email, "ana@example.com");

    manager.api().put("users/me", &json!({ "name": "Ana B" })).await?;
    assert_eq!(
        store.tokens(),
        Some(TokenPair { access_token: "a-rotated".to_owned(), refresh_token: "r-rotated".to_owned() })
    );

    assert!(manager.logout().await);
    assert!(!store.has_session());
    assert!(store.user().is_none());
    assert_eq!(nav.visits(), vec!["/login".to_owned()]);
    assert_eq!(auth.logout_auth.lock().as_slice(), ["Bearer a-rotated".to_owned()]);

    let reopened = TokenStore::open(&path)?;
    assert!(!reopened.has_session());
    Ok(())
}
