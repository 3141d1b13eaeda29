// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::MonitorConfig;

/// Configuration for the session token manager.
#[derive(Debug, Clone, clap::Args)]
pub struct SessionConfig {
    /// Base URL of the dashboard API (endpoints live under `<base>/auth/...`).
    #[arg(long, default_value = "http://localhost:5000/api", env = "DZ_API_BASE")]
    pub api_base: String,

    /// How often the monitor checks the access token, in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "DZ_CHECK_INTERVAL_MS")]
    pub check_interval_ms: u64,

    /// Refresh once the access token has at most this much lifetime left.
    #[arg(long, default_value_t = 60_000, env = "DZ_REFRESH_THRESHOLD_MS")]
    pub refresh_threshold_ms: u64,

    /// Cap for exponential backoff after transient refresh failures.
    /// 0 retries on every tick.
    #[arg(long, default_value_t = 0, env = "DZ_MAX_BACKOFF_MS")]
    pub max_backoff_ms: u64,

    /// Timeout for each outbound HTTP request, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "DZ_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Directory holding `session.json`.
    #[arg(long, env = "DZ_SESSION_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Route to navigate to after a forced logout.
    #[arg(long, default_value = "/login", env = "DZ_LOGIN_ROUTE")]
    pub login_route: String,

    /// Keep the cached user profile when the session is torn down.
    #[arg(long, env = "DZ_KEEP_USER_ON_LOGOUT")]
    pub keep_user_on_logout: bool,

    /// Log format (json or text).
    #[arg(long, env = "DZ_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DZ_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000/api".to_owned(),
            check_interval_ms: 60_000,
            refresh_threshold_ms: 60_000,
            max_backoff_ms: 0,
            request_timeout_ms: 30_000,
            state_dir: None,
            login_route: "/login".to_owned(),
            keep_user_on_logout: false,
            log_format: "text".to_owned(),
            log_level: "info".to_owned(),
        }
    }
}

impl SessionConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_millis(self.refresh_threshold_ms)
    }

    pub fn max_backoff(&self) -> Option<Duration> {
        (self.max_backoff_ms > 0).then(|| Duration::from_millis(self.max_backoff_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            period: self.check_interval(),
            threshold: self.refresh_threshold(),
            max_backoff: self.max_backoff(),
        }
    }

    pub fn endpoints(&self) -> AuthEndpoints {
        AuthEndpoints::new(&self.api_base)
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir` if set, then `$XDG_STATE_HOME/dz-session`,
    /// then `$HOME/.local/state/dz-session`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("dz-session");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/dz-session");
        }
        PathBuf::from(".dz-session")
    }

    pub fn session_file(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }
}

/// Authentication endpoint URLs derived from the API base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub login: String,
    pub register: String,
    pub logout: String,
    pub refresh_token: String,
    pub profile: String,
}

impl AuthEndpoints {
    pub fn new(api_base: &str) -> Self {
        let base = api_base.trim_end_matches('/');
        Self {
            login: format!("{base}/auth/login"),
            register: format!("{base}/auth/register"),
            logout: format!("{base}/auth/logout"),
            refresh_token: format!("{base}/auth/refresh-token"),
            profile: format!("{base}/auth/profile"),
        }
    }
}
