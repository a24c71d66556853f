//! Configuration options for the Shamah client

use std::env;
use std::time::Duration;

use crate::poll::PollMode;

/// Default key under which the token pair is persisted
pub const DEFAULT_STORAGE_KEY: &str = "authToken";

/// Default interval for list views that poll the API
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Configuration options for the Shamah client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether login persists the token pair to durable storage
    pub persist_session: bool,

    /// The key the token pair is stored under
    pub storage_key: String,

    /// Where the route guard redirects dead sessions
    pub login_path: String,

    /// Interval between polls of remote lists
    pub poll_interval: Duration,

    /// Scheduling mode for polling
    pub poll_mode: PollMode,

    /// The request timeout
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            persist_session: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            login_path: "/login".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_mode: PollMode::FixedRate,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientOptions {
    /// Build options from the defaults, overridden by environment variables.
    ///
    /// Reads `SHAMAH_POLL_INTERVAL_MS` and `SHAMAH_REQUEST_TIMEOUT_SECS`.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(raw) = env::var("SHAMAH_POLL_INTERVAL_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => options.poll_interval = Duration::from_millis(ms),
                _ => log::warn!("Ignoring invalid SHAMAH_POLL_INTERVAL_MS: {}", raw),
            }
        }

        if let Ok(raw) = env::var("SHAMAH_REQUEST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(0) => options.request_timeout = None,
                Ok(secs) => options.request_timeout = Some(Duration::from_secs(secs)),
                Err(_) => log::warn!("Ignoring invalid SHAMAH_REQUEST_TIMEOUT_SECS: {}", raw),
            }
        }

        options
    }

    /// Set whether to persist the session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    /// Set the storage key
    pub fn with_storage_key(mut self, value: &str) -> Self {
        self.storage_key = value.to_string();
        self
    }

    /// Set the login path used for redirects
    pub fn with_login_path(mut self, value: &str) -> Self {
        self.login_path = value.to_string();
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    /// Set the poll mode
    pub fn with_poll_mode(mut self, value: PollMode) -> Self {
        self.poll_mode = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }
}
