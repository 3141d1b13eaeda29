// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session monitor: wakes on a fixed period, decodes the access token's
//! expiry and refreshes it before it lapses.
//!
//! Each check runs as its own task so that a tick arriving while a refresh
//! is still pending can see the in-flight flag and skip instead of issuing a
//! second exchange.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{ErrorKind, RefreshError};
use crate::event::{emit, LogoutReason, SessionEvent};
use crate::guard::SessionGuard;
use crate::refresh::RefreshClient;
use crate::store::{TokenPair, TokenStore};

/// Current wall-clock time as epoch milliseconds.
pub fn system_now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Timing knobs for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Tick period.
    pub period: Duration,
    /// Refresh once remaining lifetime is at most this.
    pub threshold: Duration,
    /// Cap for backoff after consecutive transient failures. `None` retries
    /// on every tick.
    pub max_backoff: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            threshold: Duration::from_secs(60),
            max_backoff: None,
        }
    }
}

/// What a single check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The monitor has been stopped.
    Stopped,
    /// Another check was still in flight.
    Skipped,
    /// No token pair stored.
    NoSession,
    /// Token has more than the threshold left.
    Fresh { remaining_ms: i64 },
    /// Inside a backoff window after transient failures.
    BackingOff { retry_in_ms: i64 },
    /// New tokens stored.
    Refreshed { rotated: bool },
    /// Refresh token rejected; the session guard ran.
    LoggedOut,
    /// Refresh failed transiently; tokens left in place.
    TransientFailure,
    /// The monitor was stopped (or the session ended) while the refresh was
    /// in flight; its result was not written.
    Discarded,
}

#[derive(Debug, Default)]
struct Backoff {
    failures: u32,
    retry_at_ms: Option<i64>,
}

/// Releases the in-flight flag when the check ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        Some(Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Proactive access-token refresher.
pub struct SessionMonitor {
    store: Arc<TokenStore>,
    client: Arc<RefreshClient>,
    guard: Arc<SessionGuard>,
    config: MonitorConfig,
    clock: Arc<dyn Fn() -> i64 + Send + Sync>,
    event_tx: broadcast::Sender<SessionEvent>,
    in_flight: AtomicBool,
    backoff: Mutex<Backoff>,
    shutdown: CancellationToken,
}

impl SessionMonitor {
    pub fn new(
        store: Arc<TokenStore>,
        client: Arc<RefreshClient>,
        guard: Arc<SessionGuard>,
        config: MonitorConfig,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            store,
            client,
            guard,
            config,
            clock: Arc::new(system_now_ms),
            event_tx,
            in_flight: AtomicBool::new(false),
            backoff: Mutex::new(Backoff::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the wall clock (epoch milliseconds).
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Whether a check is currently in progress.
    pub fn is_checking(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Stop ticking. Refreshes already in flight finish but their results
    /// are discarded.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("session monitor stopped");
        }
        self.shutdown.cancel();
    }

    /// Spawn the tick loop. The first check runs immediately.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(monitor.config.period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(period_ms = monitor.config.period.as_millis() as u64, "session monitor started");

            loop {
                tokio::select! {
                    _ = monitor.shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }

                let m = Arc::clone(&monitor);
                tokio::spawn(async move {
                    let outcome = m.check().await;
                    debug!(?outcome, "session check finished");
                });
            }
        })
    }

    /// Run one Idle → Checking → Idle pass.
    pub async fn check(&self) -> CheckOutcome {
        if self.shutdown.is_cancelled() {
            return CheckOutcome::Stopped;
        }
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            debug!("previous session check still running, skipping tick");
            return CheckOutcome::Skipped;
        };

        let Some(tokens) = self.store.tokens() else {
            *self.backoff.lock() = Backoff::default();
            return CheckOutcome::NoSession;
        };

        let now = (self.clock)();
        let threshold_ms = self.config.threshold.as_millis() as i64;
        match codec::decode_expiry(&tokens.access_token) {
            Ok(expires_at) => {
                let remaining_ms = expires_at.saturating_sub(now);
                if remaining_ms > threshold_ms {
                    return CheckOutcome::Fresh { remaining_ms };
                }
                info!(remaining_ms, "access token about to expire, refreshing");
            }
            Err(e) => {
                warn!(kind = %ErrorKind::MalformedToken, err = %e, "cannot decode access token, refreshing");
            }
        }

        if let Some(retry_at) = self.backoff.lock().retry_at_ms {
            if now < retry_at {
                return CheckOutcome::BackingOff { retry_in_ms: retry_at - now };
            }
        }

        let result = self.client.refresh(&tokens.refresh_token).await;
        if self.shutdown.is_cancelled() {
            debug!("monitor stopped during refresh, discarding result");
            return CheckOutcome::Discarded;
        }

        match result {
            Ok(fresh) => self.apply_refresh(fresh.access_token, fresh.refresh_token),
            Err(RefreshError::AuthExpired(msg)) => {
                warn!(err = %msg, "refresh token rejected, ending session");
                *self.backoff.lock() = Backoff::default();
                emit(&self.event_tx, SessionEvent::RefreshFailed {
                    kind: ErrorKind::AuthExpired,
                    error: msg,
                });
                self.guard.force_logout(LogoutReason::RefreshRejected);
                CheckOutcome::LoggedOut
            }
            Err(RefreshError::Transient(msg)) => {
                let failures = self.note_transient_failure((self.clock)());
                warn!(failures, err = %msg, "token refresh failed, will retry");
                emit(&self.event_tx, SessionEvent::RefreshFailed {
                    kind: ErrorKind::TransientNetwork,
                    error: msg,
                });
                CheckOutcome::TransientFailure
            }
        }
    }

    fn apply_refresh(&self, access_token: String, refresh_token: Option<String>) -> CheckOutcome {
        let rotated = refresh_token.is_some();
        let written = match refresh_token {
            Some(refresh_token) => {
                self.store.rotate_tokens(&TokenPair { access_token, refresh_token })
            }
            None => self.store.replace_access_token(&access_token),
        };

        match written {
            Ok(true) => {
                *self.backoff.lock() = Backoff::default();
                info!(rotated, "token refreshed");
                emit(&self.event_tx, SessionEvent::Refreshed { rotated });
                CheckOutcome::Refreshed { rotated }
            }
            Ok(false) => {
                debug!("session ended during refresh, discarding result");
                CheckOutcome::Discarded
            }
            Err(e) => {
                warn!(kind = %ErrorKind::Storage, err = %e, "failed to persist refreshed token");
                emit(&self.event_tx, SessionEvent::RefreshFailed {
                    kind: ErrorKind::Storage,
                    error: e.to_string(),
                });
                CheckOutcome::TransientFailure
            }
        }
    }

    /// Record a transient failure and schedule the next allowed attempt.
    fn note_transient_failure(&self, now: i64) -> u32 {
        let mut backoff = self.backoff.lock();
        backoff.failures = backoff.failures.saturating_add(1);
        if let Some(cap) = self.config.max_backoff {
            let exp = backoff.failures.saturating_sub(1).min(16);
            let delay = self.config.period.saturating_mul(1u32 << exp).min(cap);
            backoff.retry_at_ms = Some(now + delay.as_millis() as i64);
        }
        backoff.failures
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
