// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session guard: tears the session down and sends the user to the login
//! entry point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::event::{emit, LogoutReason, SessionEvent};
use crate::refresh::RefreshClient;
use crate::store::{ClearScope, TokenStore};

/// Performs the hard navigation after a logout.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, route: &str);
}

/// Navigator for headless hosts: records the redirect in the log.
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: &str) {
        tracing::info!(route, "session ended, redirecting to login");
    }
}

/// Sentinel meaning "never navigated".
const NEVER: u64 = u64::MAX;

/// Clears the token store and navigates to the login route.
///
/// Clearing is always performed. Navigation happens once per session: any
/// number of concurrent or repeated calls for the same stored session
/// produce a single redirect.
pub struct SessionGuard {
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    forced_scope: ClearScope,
    auth: Option<Arc<RefreshClient>>,
    event_tx: broadcast::Sender<SessionEvent>,
    navigated_for: AtomicU64,
}

impl SessionGuard {
    pub fn new(
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
        login_route: impl Into<String>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            store,
            navigator,
            login_route: login_route.into(),
            forced_scope: ClearScope::All,
            auth: None,
            event_tx,
            navigated_for: AtomicU64::new(NEVER),
        }
    }

    /// Keep the cached user profile on forced logouts.
    pub fn keep_user(mut self, keep: bool) -> Self {
        self.forced_scope = if keep { ClearScope::Tokens } else { ClearScope::All };
        self
    }

    /// Client used to notify the server on explicit logout.
    pub fn with_auth_client(mut self, auth: Arc<RefreshClient>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Tear the session down after an unrecoverable auth failure.
    ///
    /// Returns whether this call performed the navigation.
    pub fn force_logout(&self, reason: LogoutReason) -> bool {
        self.teardown(self.forced_scope, reason)
    }

    /// Explicit user logout: best-effort server notification, then clear
    /// everything including the cached user.
    pub async fn logout(&self) -> bool {
        if let Some(ref auth) = self.auth {
            let tokens = self.store.tokens();
            auth.notify_logout(tokens.as_ref()).await;
        }
        self.teardown(ClearScope::All, LogoutReason::Explicit)
    }

    fn teardown(&self, scope: ClearScope, reason: LogoutReason) -> bool {
        let generation = match self.store.clear(scope) {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(err = %e, "failed to persist session clear");
                self.store.generation()
            }
        };

        if self.navigated_for.swap(generation, Ordering::SeqCst) == generation {
            tracing::debug!(?reason, "session already torn down");
            return false;
        }

        tracing::info!(?reason, "session cleared");
        emit(&self.event_tx, SessionEvent::LoggedOut { reason });
        self.navigator.navigate(&self.login_route);
        true
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
