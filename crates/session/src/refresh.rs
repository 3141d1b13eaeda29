// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the authentication service: refresh-token exchange plus the
//! login, signup and logout calls that create and end sessions.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::AuthEndpoints;
use crate::error::RefreshError;
use crate::store::{TokenPair, UserProfile};
use crate::transport::{HttpRequest, HttpTransport, Method};

/// Result of a successful refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Present only when the server rotated the refresh token.
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken", default)]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    refresh_token: Option<String>,
}

/// Response body of login and register.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl AuthResponse {
    pub fn tokens(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Talks to the `/auth/*` endpoints over the shared transport.
pub struct RefreshClient {
    transport: Arc<dyn HttpTransport>,
    endpoints: AuthEndpoints,
}

impl RefreshClient {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: AuthEndpoints) -> Self {
        Self { transport, endpoints }
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// A 401 means the refresh token itself is no longer accepted. Every other
    /// failure is transient.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let req = HttpRequest::new(Method::Post, &self.endpoints.refresh_token)
            .json(&serde_json::json!({ "refreshToken": refresh_token }));

        let resp = self
            .transport
            .send(req)
            .await
            .map_err(|e| RefreshError::Transient(format!("HTTP error: {e:#}")))?;

        if resp.status == 401 {
            return Err(RefreshError::AuthExpired(resp.text()));
        }
        if !resp.is_success() {
            return Err(RefreshError::Transient(format!("HTTP {}: {}", resp.status, resp.text())));
        }

        let parsed: RefreshResponse = serde_json::from_slice(&resp.body)
            .map_err(|e| RefreshError::Transient(format!("parse response: {e}")))?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::Transient("response has no accessToken".to_owned()))?;

        Ok(RefreshedTokens {
            access_token,
            refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
        })
    }

    /// Tell the server the session is over. Best effort: failures are logged
    /// and never surface to the caller.
    pub async fn notify_logout(&self, tokens: Option<&TokenPair>) {
        let mut req = HttpRequest::new(Method::Post, &self.endpoints.logout);
        req = match tokens {
            Some(pair) => req
                .json(&serde_json::json!({ "refreshToken": pair.refresh_token }))
                .bearer(&pair.access_token),
            None => req.json(&serde_json::json!({})),
        };

        match self.transport.send(req).await {
            Ok(resp) if resp.is_success() => tracing::debug!("server logout acknowledged"),
            Ok(resp) => tracing::debug!(status = resp.status, "server logout rejected"),
            Err(e) => tracing::warn!(err = %e, "server logout failed"),
        }
    }

    /// Authenticate with email and password.
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<AuthResponse> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.auth_call(&self.endpoints.login, &body).await
    }

    /// Create an account. The backend signs the new user in immediately.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<AuthResponse> {
        let body = serde_json::json!({ "name": name, "email": email, "password": password });
        self.auth_call(&self.endpoints.register, &body).await
    }

    async fn auth_call(&self, url: &str, body: &serde_json::Value) -> anyhow::Result<AuthResponse> {
        let resp = self.transport.send(HttpRequest::new(Method::Post, url).json(body)).await?;
        if !resp.is_success() {
            anyhow::bail!("{url} failed ({}): {}", resp.status, resp.text());
        }
        Ok(serde_json::from_slice(&resp.body)?)
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
