// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why an access token could not be decoded.
///
/// Always recoverable: the monitor treats an undecodable token as expired
/// and attempts a refresh.
#[derive(Debug, thiserror::Error)]
pub enum MalformedToken {
    #[error("expected 3 dot-separated segments, found {0}")]
    Segments(usize),
    #[error("payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no numeric `exp` claim")]
    MissingExpiry,
}

/// Failure of the refresh-token exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    /// The auth service rejected the refresh token. Terminal for the session.
    #[error("refresh token rejected: {0}")]
    AuthExpired(String),
    /// Anything else. The session is left untouched and retried later.
    #[error("transient refresh failure: {0}")]
    Transient(String),
}

impl RefreshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthExpired(_) => ErrorKind::AuthExpired,
            Self::Transient(_) => ErrorKind::TransientNetwork,
        }
    }
}

/// Persistence failure in the token store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Failure of a regular authenticated API call.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport: {0:#}")]
    Transport(anyhow::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response decode: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Machine-readable error classes, used in logs and session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedToken,
    AuthExpired,
    TransientNetwork,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::TransientNetwork => "TRANSIENT_NETWORK",
            Self::Storage => "STORAGE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
