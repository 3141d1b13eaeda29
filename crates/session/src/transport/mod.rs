// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound HTTP transport abstraction shared by every API caller.

pub mod intercept;
pub mod reqwest_transport;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::event::SessionEvent;
use crate::store::TokenStore;
use crate::transport::intercept::TokenCapture;

pub use crate::transport::reqwest_transport::ReqwestTransport;

/// HTTP method subset used against the dashboard API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// An outbound request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: Vec::new(), body: None }
    }

    /// Attach a JSON body and the matching content type.
    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
        self.body = Some(Bytes::from(body.to_string()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Look up a header value (case-insensitive name).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends requests and returns buffered responses.
///
/// Object-safe for use as `Arc<dyn HttpTransport>`. An `Err` means no HTTP
/// response was obtained at all (connect failure, timeout, body read error).
pub trait HttpTransport: Send + Sync + 'static {
    fn send(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send + '_>>;
}

/// The transport the application depends on.
///
/// Holds the unwrapped base transport and, while installed, a single
/// token-capturing interceptor around it. Installing again replaces the
/// interceptor instead of nesting, and removing it restores the base.
pub struct TransportSlot {
    base: Arc<dyn HttpTransport>,
    active: RwLock<Option<Arc<TokenCapture>>>,
}

impl TransportSlot {
    pub fn new(base: Arc<dyn HttpTransport>) -> Arc<Self> {
        Arc::new(Self { base, active: RwLock::new(None) })
    }

    /// Wrap the base transport with a [`TokenCapture`] writing into `store`.
    pub fn install_interceptor(
        &self,
        store: Arc<TokenStore>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) {
        let capture = TokenCapture::new(Arc::clone(&self.base), store, event_tx);
        let previous = self.active.write().replace(Arc::new(capture));
        if let Some(ref old) = previous {
            old.detach();
        }
        tracing::debug!(replaced = previous.is_some(), "response interceptor installed");
    }

    /// Restore the base transport. No-op when nothing is installed.
    pub fn remove_interceptor(&self) {
        if let Some(capture) = self.active.write().take() {
            capture.detach();
            tracing::debug!("response interceptor removed");
        }
    }

    pub fn is_intercepted(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn base(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.base)
    }

    /// The transport requests currently flow through.
    pub fn current(&self) -> Arc<dyn HttpTransport> {
        match self.active.read().as_ref() {
            Some(capture) => Arc::clone(capture) as Arc<dyn HttpTransport>,
            None => Arc::clone(&self.base),
        }
    }

    /// The installed interceptor, if any.
    pub fn interceptor(&self) -> Option<Arc<TokenCapture>> {
        self.active.read().clone()
    }
}

impl HttpTransport for TransportSlot {
    fn send(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send + '_>> {
        let current = self.current();
        Box::pin(async move { current.send(req).await })
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
