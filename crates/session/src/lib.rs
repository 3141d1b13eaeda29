// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! dz-session: keeps a dashboard's bearer-token session alive.
//!
//! A [`monitor::SessionMonitor`] refreshes the access token shortly before
//! it expires, a [`transport::intercept::TokenCapture`] picks up token pairs
//! rotated by ordinary API calls, and a [`guard::SessionGuard`] clears the
//! session and redirects to login once the refresh token is rejected.

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod guard;
pub mod manager;
pub mod monitor;
pub mod refresh;
pub mod store;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::SessionConfig;
use crate::guard::LogNavigator;
use crate::manager::{SessionManager, SessionOptions};
use crate::store::TokenStore;
use crate::transport::ReqwestTransport;

pub fn init_tracing(config: &SessionConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().with_writer(std::io::stderr).try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Open the file-backed store named by `config`.
pub fn open_store(config: &SessionConfig) -> anyhow::Result<Arc<TokenStore>> {
    let path = config.session_file();
    let store = TokenStore::open(&path)
        .with_context(|| format!("failed to open session file {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Start a session manager over a reqwest transport.
pub fn start(config: &SessionConfig) -> anyhow::Result<SessionManager> {
    let store = open_store(config)?;
    let transport = Arc::new(ReqwestTransport::new(config.request_timeout()));
    Ok(SessionManager::start(
        SessionOptions::from_config(config),
        store,
        transport,
        Arc::new(LogNavigator),
    ))
}

/// Like [`start`], but without the background monitor.
pub fn connect(config: &SessionConfig) -> anyhow::Result<SessionManager> {
    let store = open_store(config)?;
    let transport = Arc::new(ReqwestTransport::new(config.request_timeout()));
    Ok(SessionManager::connect(
        SessionOptions::from_config(config),
        store,
        transport,
        Arc::new(LogNavigator),
    ))
}

/// Keep the stored session fresh until Ctrl-C.
pub async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let manager = start(&config)?;
    info!(
        api_base = %config.api_base,
        session_file = %config.session_file().display(),
        has_session = manager.store().has_session(),
        "session manager running"
    );

    let mut events = manager.subscribe();
    loop {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r.context("failed to listen for ctrl-c")?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => info!(?event, "session event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "session event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    info!("shutting down");
    manager.shutdown();
    Ok(())
}
