// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicI64;

use super::*;
use crate::config::AuthEndpoints;
use crate::test_support::{mint_token, MockTransport, RecordingNavigator, Scripted};
use crate::transport::HttpTransport;

/// Fixed "now" used by most tests, aligned to a whole second.
const NOW_MS: i64 = 1_800_000_000_000;

struct Harness {
    monitor: Arc<SessionMonitor>,
    store: Arc<TokenStore>,
    transport: Arc<MockTransport>,
    nav: Arc<RecordingNavigator>,
    events: broadcast::Receiver<SessionEvent>,
}

fn harness(transport: Arc<MockTransport>, config: MonitorConfig, clock: Arc<AtomicI64>) -> Harness {
    let store = Arc::new(TokenStore::in_memory());
    let nav = RecordingNavigator::new();
    let (tx, events) = broadcast::channel(32);
    let client = Arc::new(RefreshClient::new(
        Arc::clone(&transport) as Arc<dyn HttpTransport>,
        AuthEndpoints::new("http://auth.test/api"),
    ));
    let guard = Arc::new(SessionGuard::new(Arc::clone(&store), nav.clone(), "/login", tx.clone()));
    let monitor = SessionMonitor::new(Arc::clone(&store), client, guard, config, tx)
        .with_clock(Arc::new(move || clock.load(Ordering::SeqCst)));
    Harness { monitor: Arc::new(monitor), store, transport, nav, events }
}

fn fixed_clock(ms: i64) -> Arc<AtomicI64> {
    Arc::new(AtomicI64::new(ms))
}

fn seed(store: &TokenStore, access_token: String) -> anyhow::Result<()> {
    store.set_tokens(&TokenPair { access_token, refresh_token: "r1".to_owned() })?;
    Ok(())
}

fn refreshed_body(exp_secs: i64) -> Scripted {
    Scripted::json(200, serde_json::json!({ "accessToken": mint_token(exp_secs) }))
}

#[tokio::test]
async fn no_session_is_a_noop() {
    let h = harness(MockTransport::new(vec![]), MonitorConfig::default(), fixed_clock(NOW_MS));
    assert_eq!(h.monitor.check().await, CheckOutcome::NoSession);
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn remaining_equal_to_threshold_refreshes() -> anyhow::Result<()> {
    let exp_secs = NOW_MS / 1000 + 60;
    let h = harness(
        MockTransport::new(vec![refreshed_body(exp_secs + 900)]),
        MonitorConfig::default(),
        fixed_clock(NOW_MS),
    );
    seed(&h.store, mint_token(exp_secs))?;

    assert_eq!(h.monitor.check().await, CheckOutcome::Refreshed { rotated: false });
    assert_eq!(h.transport.calls(), 1);
    let stored = h.store.tokens().map(|t| t.access_token).unwrap_or_default();
    assert_eq!(stored, mint_token(exp_secs + 900));
    assert_eq!(h.store.get(crate::store::StoreKey::RefreshToken).as_deref(), Some("r1"));
    Ok(())
}

#[tokio::test]
async fn one_ms_above_threshold_does_not_refresh() -> anyhow::Result<()> {
    let exp_secs = NOW_MS / 1000 + 60;
    let h = harness(
        MockTransport::new(vec![refreshed_body(exp_secs + 900)]),
        MonitorConfig::default(),
        fixed_clock(exp_secs * 1000 - 60_001),
    );
    seed(&h.store, mint_token(exp_secs))?;

    assert_eq!(h.monitor.check().await, CheckOutcome::Fresh { remaining_ms: 60_001 });
    assert_eq!(h.transport.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_access_token_is_treated_as_expired() -> anyhow::Result<()> {
    let h = harness(
        MockTransport::new(vec![refreshed_body(NOW_MS / 1000 + 900)]),
        MonitorConfig::default(),
        fixed_clock(NOW_MS),
    );
    seed(&h.store, "not-a-token".to_owned())?;

    assert_eq!(h.monitor.check().await, CheckOutcome::Refreshed { rotated: false });
    assert_eq!(h.transport.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn rotated_refresh_token_replaces_the_pair() -> anyhow::Result<()> {
    let new_access = mint_token(NOW_MS / 1000 + 900);
    let h = harness(
        MockTransport::new(vec![Scripted::json(
            200,
            serde_json::json!({ "accessToken": new_access, "refreshToken": "r2" }),
        )]),
        MonitorConfig::default(),
        fixed_clock(NOW_MS),
    );
    seed(&h.store, mint_token(NOW_MS / 1000))?;

    let mut events = h.events;
    assert_eq!(h.monitor.check().await, CheckOutcome::Refreshed { rotated: true });
    assert_eq!(
        h.store.tokens(),
        Some(TokenPair { access_token: new_access, refresh_token: "r2".to_owned() })
    );
    assert!(matches!(events.try_recv(), Ok(SessionEvent::Refreshed { rotated: true })));
    Ok(())
}

#[tokio::test]
async fn tick_during_pending_refresh_is_skipped() -> anyhow::Result<()> {
    let transport = MockTransport::gated(vec![refreshed_body(NOW_MS / 1000 + 900)]);
    let h = harness(Arc::clone(&transport), MonitorConfig::default(), fixed_clock(NOW_MS));
    seed(&h.store, mint_token(NOW_MS / 1000))?;

    let first = tokio::spawn({
        let m = Arc::clone(&h.monitor);
        async move { m.check().await }
    });
    while transport.calls() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(h.monitor.is_checking());

    assert_eq!(h.monitor.check().await, CheckOutcome::Skipped);
    assert_eq!(h.monitor.check().await, CheckOutcome::Skipped);

    transport.release(1);
    assert_eq!(first.await?, CheckOutcome::Refreshed { rotated: false });
    assert_eq!(transport.calls(), 1);
    assert!(!h.monitor.is_checking());
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_clears_and_navigates_once() -> anyhow::Result<()> {
    let h = harness(
        MockTransport::new(vec![Scripted::Respond(401, "Invalid refresh token".to_owned())]),
        MonitorConfig::default(),
        fixed_clock(NOW_MS),
    );
    h.store.establish(
        &TokenPair { access_token: mint_token(NOW_MS / 1000), refresh_token: "r1".to_owned() },
        None,
    )?;
    let mut events = h.events;

    assert_eq!(h.monitor.check().await, CheckOutcome::LoggedOut);
    assert!(h.store.tokens().is_none());
    assert!(h.store.get(crate::store::StoreKey::AccessToken).is_none());
    assert_eq!(h.nav.visits(), vec!["/login".to_owned()]);
    assert!(h.monitor.is_running());

    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::RefreshFailed { kind: ErrorKind::AuthExpired, .. })
    ));
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::LoggedOut { reason: LogoutReason::RefreshRejected })
    ));

    // Later ticks find no session and do nothing.
    assert_eq!(h.monitor.check().await, CheckOutcome::NoSession);
    assert_eq!(h.nav.visits().len(), 1);
    Ok(())
}

#[tokio::test]
async fn transient_failure_leaves_tokens_alone() -> anyhow::Result<()> {
    let h = harness(
        MockTransport::new(vec![
            Scripted::Respond(503, "unavailable".to_owned()),
            Scripted::Fail("connection refused".to_owned()),
        ]),
        MonitorConfig::default(),
        fixed_clock(NOW_MS),
    );
    let access = mint_token(NOW_MS / 1000 + 10);
    seed(&h.store, access.clone())?;
    let mut events = h.events;

    assert_eq!(h.monitor.check().await, CheckOutcome::TransientFailure);
    assert_eq!(h.monitor.check().await, CheckOutcome::TransientFailure);

    assert_eq!(h.transport.calls(), 2);
    assert_eq!(
        h.store.tokens(),
        Some(TokenPair { access_token: access, refresh_token: "r1".to_owned() })
    );
    assert!(h.nav.visits().is_empty());
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::RefreshFailed { kind: ErrorKind::TransientNetwork, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn result_after_stop_is_discarded() -> anyhow::Result<()> {
    let transport = MockTransport::gated(vec![refreshed_body(NOW_MS / 1000 + 900)]);
    let h = harness(Arc::clone(&transport), MonitorConfig::default(), fixed_clock(NOW_MS));
    let access = mint_token(NOW_MS / 1000);
    seed(&h.store, access.clone())?;

    let pending = tokio::spawn({
        let m = Arc::clone(&h.monitor);
        async move { m.check().await }
    });
    while transport.calls() == 0 {
        tokio::task::yield_now().await;
    }
    h.monitor.stop();
    transport.release(1);

    assert_eq!(pending.await?, CheckOutcome::Discarded);
    assert_eq!(h.store.tokens().map(|t| t.access_token), Some(access));
    assert_eq!(h.monitor.check().await, CheckOutcome::Stopped);
    Ok(())
}

#[tokio::test]
async fn refresh_finishing_after_logout_does_not_resurrect_session() -> anyhow::Result<()> {
    let transport = MockTransport::gated(vec![refreshed_body(NOW_MS / 1000 + 900)]);
    let h = harness(Arc::clone(&transport), MonitorConfig::default(), fixed_clock(NOW_MS));
    seed(&h.store, mint_token(NOW_MS / 1000))?;

    let pending = tokio::spawn({
        let m = Arc::clone(&h.monitor);
        async move { m.check().await }
    });
    while transport.calls() == 0 {
        tokio::task::yield_now().await;
    }
    h.store.clear(crate::store::ClearScope::All)?;
    transport.release(1);

    assert_eq!(pending.await?, CheckOutcome::Discarded);
    assert!(h.store.get(crate::store::StoreKey::AccessToken).is_none());
    Ok(())
}

#[tokio::test]
async fn backoff_spaces_out_retries_and_resets_on_success() -> anyhow::Result<()> {
    let clock = fixed_clock(NOW_MS);
    let config = MonitorConfig {
        period: Duration::from_secs(60),
        threshold: Duration::from_secs(60),
        max_backoff: Some(Duration::from_secs(90)),
    };
    let h = harness(
        MockTransport::new(vec![
            Scripted::Respond(502, String::new()),
            Scripted::Respond(502, String::new()),
            refreshed_body(NOW_MS / 1000 + 3600),
        ]),
        config,
        Arc::clone(&clock),
    );
    seed(&h.store, mint_token(NOW_MS / 1000))?;

    // First failure: wait one period.
    assert_eq!(h.monitor.check().await, CheckOutcome::TransientFailure);
    clock.store(NOW_MS + 30_000, Ordering::SeqCst);
    assert_eq!(h.monitor.check().await, CheckOutcome::BackingOff { retry_in_ms: 30_000 });

    // Second failure: 2 periods, capped at 90 s.
    clock.store(NOW_MS + 60_000, Ordering::SeqCst);
    assert_eq!(h.monitor.check().await, CheckOutcome::TransientFailure);
    clock.store(NOW_MS + 120_000, Ordering::SeqCst);
    assert_eq!(h.monitor.check().await, CheckOutcome::BackingOff { retry_in_ms: 30_000 });
    assert_eq!(h.transport.calls(), 2);

    clock.store(NOW_MS + 150_000, Ordering::SeqCst);
    assert_eq!(h.monitor.check().await, CheckOutcome::Refreshed { rotated: false });
    assert_eq!(h.transport.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn spawned_monitor_checks_immediately_and_stops() -> anyhow::Result<()> {
    let config = MonitorConfig { period: Duration::from_secs(3600), ..MonitorConfig::default() };
    let h = harness(
        MockTransport::new(vec![refreshed_body(NOW_MS / 1000 + 900)]),
        config,
        fixed_clock(NOW_MS),
    );
    seed(&h.store, mint_token(NOW_MS / 1000 + 30))?;

    let handle = h.monitor.spawn();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.transport.calls() == 0 || h.monitor.is_checking() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    let stored = h.store.tokens().map(|t| t.access_token).unwrap_or_default();
    assert_eq!(stored, mint_token(NOW_MS / 1000 + 900));

    h.monitor.stop();
    tokio::time::timeout(Duration::from_secs(5), handle).await??;
    assert!(!h.monitor.is_running());
    Ok(())
}
