// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: token minting, scripted transports, and a
//! recording navigator.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::guard::Navigator;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Build an unsigned three-segment token carrying `exp` (epoch seconds).
pub fn mint_token(exp_secs: i64) -> String {
    mint_token_with(&serde_json::json!({ "exp": exp_secs, "sub": "test-user" }))
}

/// Build an unsigned three-segment token with arbitrary claims.
pub fn mint_token_with(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    crate::monitor::system_now_ms()
}

/// A scripted response for [`MockTransport`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(u16, String),
    Fail(String),
}

impl Scripted {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond(status, body.to_string())
    }
}

/// In-process transport that replays scripted responses in order and
/// records every request it sees. The last script entry repeats.
///
/// With [`MockTransport::gated`], each request waits for a permit released
/// through [`MockTransport::release`], which lets tests hold a request
/// in flight.
pub struct MockTransport {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicU32,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            gate: None,
        })
    }

    pub fn gated(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    /// Let `n` gated requests complete.
    pub fn release(&self, n: usize) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    fn next_response(&self) -> Scripted {
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        match next {
            Some(s) => {
                *last = Some(s.clone());
                s
            }
            None => last.clone().unwrap_or_else(|| Scripted::Respond(500, "{}".to_owned())),
        }
    }
}

impl HttpTransport for MockTransport {
    fn send(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(req);
            if let Some(ref gate) = self.gate {
                let permit = gate.acquire().await?;
                permit.forget();
            }
            match self.next_response() {
                Scripted::Respond(status, body) => {
                    Ok(HttpResponse { status, body: Bytes::from(body) })
                }
                Scripted::Fail(msg) => Err(anyhow::anyhow!(msg)),
            }
        })
    }
}

/// Navigator that records every route it is asked to visit.
#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.visits.lock().push(route.to_owned());
    }
}
