// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response interceptor: absorbs rotated token pairs from any API response.
//!
//! Some endpoints (profile updates, for example) re-sign the session and
//! return a fresh `{accessToken, refreshToken}` pair alongside their normal
//! payload. The interceptor persists such pairs no matter who made the call
//! and hands the response back untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::broadcast;

use crate::event::{emit, SessionEvent};
use crate::store::{TokenPair, TokenStore};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

#[derive(Deserialize)]
struct RotatedPair {
    #[serde(rename = "accessToken", default)]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    refresh_token: Option<String>,
}

/// Extract a non-empty token pair from a response body, if one is present.
///
/// Anything that is not a JSON object carrying both fields as non-empty
/// strings yields `None`.
pub fn rotated_pair(body: &[u8]) -> Option<TokenPair> {
    let parsed: RotatedPair = serde_json::from_slice(body).ok()?;
    let access_token = parsed.access_token.filter(|t| !t.is_empty())?;
    let refresh_token = parsed.refresh_token.filter(|t| !t.is_empty())?;
    Some(TokenPair { access_token, refresh_token })
}

/// Decorator around a transport that captures rotated tokens.
///
/// Pairs only replace a live session: a response arriving after logout
/// cannot bring it back. Once detached, responses still in flight are
/// passed through without being inspected.
pub struct TokenCapture {
    inner: Arc<dyn HttpTransport>,
    store: Arc<TokenStore>,
    event_tx: broadcast::Sender<SessionEvent>,
    detached: AtomicBool,
}

impl TokenCapture {
    pub fn new(
        inner: Arc<dyn HttpTransport>,
        store: Arc<TokenStore>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { inner, store, event_tx, detached: AtomicBool::new(false) }
    }

    /// Stop capturing, including for requests already in flight.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// The transport this interceptor wraps.
    pub fn inner(&self) -> &Arc<dyn HttpTransport> {
        &self.inner
    }

    fn inspect(&self, url: &str, resp: &HttpResponse) {
        if self.is_detached() {
            tracing::trace!(url, "interceptor detached, response not inspected");
            return;
        }
        let Some(pair) = rotated_pair(&resp.body) else {
            tracing::trace!(url, "no rotated tokens in response");
            return;
        };
        match self.store.rotate_tokens(&pair) {
            Ok(true) => {
                tracing::info!(url, "captured rotated tokens from response");
                emit(&self.event_tx, SessionEvent::Rotated);
            }
            Ok(false) => tracing::debug!(url, "no live session, ignoring token pair"),
            Err(e) => tracing::warn!(url, err = %e, "failed to persist rotated tokens"),
        }
    }
}

impl HttpTransport for TokenCapture {
    fn send(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let url = req.url.clone();
            let resp = self.inner.send(req).await?;
            self.inspect(&url, &resp);
            Ok(resp)
        })
    }
}

#[cfg(test)]
#[path = "intercept_tests.rs"]
mod tests;
