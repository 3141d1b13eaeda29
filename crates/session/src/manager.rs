// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle wiring: interceptor, refresh client, guard and monitor
//! behind one handle.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::config::AuthEndpoints;
use crate::event::{emit, SessionEvent};
use crate::guard::{Navigator, SessionGuard};
use crate::monitor::{MonitorConfig, SessionMonitor};
use crate::refresh::{AuthResponse, RefreshClient};
use crate::store::TokenStore;
use crate::transport::{HttpTransport, TransportSlot};

/// Everything [`SessionManager::start`] and [`SessionManager::connect`] need.
pub struct SessionOptions {
    pub endpoints: AuthEndpoints,
    pub api_base: String,
    pub monitor: MonitorConfig,
    pub login_route: String,
    pub keep_user_on_logout: bool,
    pub clock: Option<Arc<dyn Fn() -> i64 + Send + Sync>>,
}

impl SessionOptions {
    pub fn new(api_base: impl Into<String>) -> Self {
        let api_base = api_base.into();
        Self {
            endpoints: AuthEndpoints::new(&api_base),
            api_base,
            monitor: MonitorConfig::default(),
            login_route: "/login".to_owned(),
            keep_user_on_logout: false,
            clock: None,
        }
    }

    pub fn from_config(config: &crate::config::SessionConfig) -> Self {
        Self {
            endpoints: config.endpoints(),
            api_base: config.api_base.clone(),
            monitor: config.monitor(),
            login_route: config.login_route.clone(),
            keep_user_on_logout: config.keep_user_on_logout,
            clock: None,
        }
    }
}

/// Handle to a session. Dropping it tears the monitor (if started) and the
/// interceptor down.
pub struct SessionManager {
    store: Arc<TokenStore>,
    slot: Arc<TransportSlot>,
    auth: Arc<RefreshClient>,
    guard: Arc<SessionGuard>,
    monitor: Arc<SessionMonitor>,
    api: ApiClient,
    event_tx: broadcast::Sender<SessionEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Install the interceptor on `base` and start the monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        options: SessionOptions,
        store: Arc<TokenStore>,
        base: Arc<dyn HttpTransport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let manager = Self::connect(options, store, base, navigator);
        *manager.task.lock() = Some(manager.monitor.spawn());
        manager
    }

    /// Install the interceptor on `base` without starting the monitor.
    ///
    /// For one-shot login, register and logout, where a background refresh
    /// would race the command itself.
    pub fn connect(
        options: SessionOptions,
        store: Arc<TokenStore>,
        base: Arc<dyn HttpTransport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);

        let slot = TransportSlot::new(base);
        slot.install_interceptor(Arc::clone(&store), event_tx.clone());
        let shared = Arc::clone(&slot) as Arc<dyn HttpTransport>;

        let auth = Arc::new(RefreshClient::new(Arc::clone(&shared), options.endpoints));
        let guard = Arc::new(
            SessionGuard::new(Arc::clone(&store), navigator, options.login_route, event_tx.clone())
                .keep_user(options.keep_user_on_logout)
                .with_auth_client(Arc::clone(&auth)),
        );

        let mut monitor = SessionMonitor::new(
            Arc::clone(&store),
            Arc::clone(&auth),
            Arc::clone(&guard),
            options.monitor,
            event_tx.clone(),
        );
        if let Some(clock) = options.clock {
            monitor = monitor.with_clock(clock);
        }
        let monitor = Arc::new(monitor);

        let api = ApiClient::new(shared, Arc::clone(&store), options.api_base)
            .with_guard(Arc::clone(&guard));

        Self { store, slot, auth, guard, monitor, api, event_tx, task: Mutex::new(None) }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// The shared, intercepted transport.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.slot) as Arc<dyn HttpTransport>
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    pub fn monitor(&self) -> &Arc<SessionMonitor> {
        &self.monitor
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Sign in and store the new session.
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<AuthResponse> {
        let resp = self.auth.login(email, password).await?;
        self.establish(&resp)?;
        Ok(resp)
    }

    /// Create an account and store the session it comes with.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<AuthResponse> {
        let resp = self.auth.register(name, email, password).await?;
        self.establish(&resp)?;
        Ok(resp)
    }

    /// Explicit logout. Returns whether a redirect was issued.
    pub async fn logout(&self) -> bool {
        self.guard.logout().await
    }

    fn establish(&self, resp: &AuthResponse) -> anyhow::Result<()> {
        self.store.establish(&resp.tokens(), resp.user.as_ref())?;
        tracing::info!(user = resp.user.as_ref().map(|u| u.email.as_str()), "session established");
        emit(&self.event_tx, SessionEvent::Established);
        Ok(())
    }

    /// Stop the monitor and restore the unwrapped transport. Idempotent.
    pub fn shutdown(&self) {
        self.monitor.stop();
        self.slot.remove_interceptor();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
