// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated JSON calls against the dashboard API.

use std::sync::Arc;

use serde_json::Value;

use crate::config::AuthEndpoints;
use crate::error::ApiError;
use crate::event::LogoutReason;
use crate::guard::SessionGuard;
use crate::store::{TokenStore, UserProfile};
use crate::transport::{HttpRequest, HttpTransport, Method};

/// Sends JSON requests with the stored bearer token attached.
///
/// Requests go through the shared transport, so any rotated token pair in a
/// response is captured while the interceptor is installed.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    store: Arc<TokenStore>,
    guard: Option<Arc<SessionGuard>>,
    api_base: String,
    profile_url: String,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<TokenStore>,
        api_base: impl Into<String>,
    ) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_owned();
        let profile_url = AuthEndpoints::new(&api_base).profile;
        Self { transport, store, guard: None, api_base, profile_url }
    }

    /// End the session on any 401 response.
    pub fn with_guard(mut self, guard: Arc<SessionGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Resolve a path against the API base. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        let mut req = HttpRequest::new(method, &url);
        req = match body {
            Some(body) => req.json(body),
            None => req.header("Content-Type", "application/json"),
        };
        if let Some(token) = self.store.tokens().map(|t| t.access_token) {
            req = req.bearer(&token);
        }

        let resp = self.transport.send(req).await.map_err(ApiError::Transport)?;
        if resp.status == 401 {
            if let Some(ref guard) = self.guard {
                tracing::warn!(url = %url, "API call unauthorized, ending session");
                guard.force_logout(LogoutReason::Unauthorized);
            }
        }
        if !resp.is_success() {
            return Err(ApiError::Status { status: resp.status, body: resp.text() });
        }
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&resp.body)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::Delete, path, None).await
    }

    /// Fetch the signed-in user's profile and refresh the cached copy.
    ///
    /// Accepts either a bare profile or one wrapped in `{"user": ...}`.
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let mut value = self.get(&self.profile_url).await?;
        if let Some(user) = value.get_mut("user") {
            value = user.take();
        }
        let profile: UserProfile = serde_json::from_value(value)?;
        if let Err(e) = self.store.set_user(&profile) {
            tracing::warn!(err = %e, "failed to cache user profile");
        }
        Ok(profile)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
