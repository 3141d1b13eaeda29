// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorKind;

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked to log out.
    Explicit,
    /// The refresh token was rejected.
    RefreshRejected,
    /// A regular API call came back 401.
    Unauthorized,
}

/// Session lifecycle events, broadcast to any interested subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Login or signup stored a new session.
    Established,
    /// The monitor exchanged the refresh token.
    Refreshed { rotated: bool },
    /// A rotated pair was captured from an API response.
    Rotated,
    RefreshFailed { kind: ErrorKind, error: String },
    LoggedOut { reason: LogoutReason },
}

/// Broadcast `event` to current subscribers.
///
/// Events are advisory: a send with no subscribers is not an error.
pub(crate) fn emit(tx: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(broadcast::error::SendError(event)) = tx.send(event) {
        tracing::trace!(?event, "no session event subscribers");
    }
}
