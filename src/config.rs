//! Engine configuration.
//!
//! [`EngineConfig`] carries the backend location and every timer the engine
//! runs on. Use the builder methods to customize it, or [`EngineConfig::from_env`]
//! to pick up overrides from the environment.

use std::time::Duration;

/// Environment variable overriding the backend base URL.
pub const URL_ENV: &str = "LINKWATCH_URL";

/// Environment variable overriding the slow poll interval, in seconds.
pub const POLL_SLOW_ENV: &str = "LINKWATCH_POLL_SLOW_SECS";

/// Default backend base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Shortest period any engine timer runs at.
pub const MIN_TIMER_INTERVAL: Duration = Duration::from_millis(10);

/// Raise `interval` to [`MIN_TIMER_INTERVAL`].
///
/// A zero period panics `tokio::time::interval` and spins the poll loop.
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_TIMER_INTERVAL)
}

/// Hints shown while the user waits on a pairing step.
pub const DEFAULT_HINTS: &[&str] = &[
    "Open WhatsApp on your phone",
    "Go to Settings, then Linked Devices",
    "Tap \"Link a device\" and scan the code",
    "Keep your phone online until syncing finishes",
];

/// Configuration for a [`crate::engine::LinkEngine`].
///
/// # Example
///
/// ```ignore
/// use linkwatch::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig::default()
///     .with_base_url("http://10.0.0.5:8000")
///     .with_poll_slow_interval(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Backend base URL, without a trailing slash
    pub base_url: String,
    /// Delay before reopening the push stream after it closes or fails
    pub push_retry_delay: Duration,
    /// Poll interval while the link is in a transitional phase
    pub poll_fast_interval: Duration,
    /// Poll interval while the link is settled
    pub poll_slow_interval: Duration,
    /// How often a referenced QR image is re-fetched while displayed
    pub qr_refresh_interval: Duration,
    /// Delay before retrying a failed QR image fetch
    pub qr_retry_delay: Duration,
    /// How long each hint stays up
    pub hint_interval: Duration,
    /// Elapsed-time recompute period
    pub elapsed_tick: Duration,
    /// Bound of the candidate queue feeding the reconciler
    pub candidate_queue_capacity: usize,
    /// Rotating advisory strings
    pub hints: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            push_retry_delay: Duration::from_secs(2),
            poll_fast_interval: Duration::from_secs(2),
            poll_slow_interval: Duration::from_secs(30),
            qr_refresh_interval: Duration::from_secs(55),
            qr_retry_delay: Duration::from_secs(2),
            hint_interval: Duration::from_secs(4),
            elapsed_tick: Duration::from_secs(1),
            candidate_queue_capacity: 64,
            hints: DEFAULT_HINTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend base URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_push_retry_delay(mut self, delay: Duration) -> Self {
        self.push_retry_delay = clamp_interval(delay);
        self
    }

    pub fn with_poll_fast_interval(mut self, interval: Duration) -> Self {
        self.poll_fast_interval = clamp_interval(interval);
        self
    }

    pub fn with_poll_slow_interval(mut self, interval: Duration) -> Self {
        self.poll_slow_interval = clamp_interval(interval);
        self
    }

    pub fn with_qr_refresh_interval(mut self, interval: Duration) -> Self {
        self.qr_refresh_interval = clamp_interval(interval);
        self
    }

    pub fn with_qr_retry_delay(mut self, delay: Duration) -> Self {
        self.qr_retry_delay = clamp_interval(delay);
        self
    }

    pub fn with_hint_interval(mut self, interval: Duration) -> Self {
        self.hint_interval = clamp_interval(interval);
        self
    }

    pub fn with_elapsed_tick(mut self, tick: Duration) -> Self {
        self.elapsed_tick = clamp_interval(tick);
        self
    }

    /// Set the candidate queue bound (at least 1).
    pub fn with_candidate_queue_capacity(mut self, capacity: usize) -> Self {
        self.candidate_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hints = hints.into_iter().map(Into::into).collect();
        self
    }

    /// Defaults with `LINKWATCH_URL` and `LINKWATCH_POLL_SLOW_SECS` applied.
    ///
    /// Unparseable or zero interval values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(URL_ENV) {
            if !url.trim().is_empty() {
                config = config.with_base_url(url.trim());
            }
        }

        if let Ok(raw) = std::env::var(POLL_SLOW_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    config = config.with_poll_slow_interval(Duration::from_secs(secs));
                }
                _ => tracing::warn!(value = %raw, "Ignoring invalid {}", POLL_SLOW_ENV),
            }
        }

        config
    }

    /// Backend URLs derived from the base URL.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.base_url)
    }
}

/// Backend URLs the engine talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
    pub status: String,
    pub status_stream: String,
    pub connect: String,
    pub disconnect: String,
    pub logout: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let api = format!("{}/api/whatsapp", base);
        Self {
            base_url: base.to_string(),
            status: format!("{}/status", api),
            status_stream: format!("{}/status/stream", api),
            connect: format!("{}/connect", api),
            disconnect: format!("{}/disconnect", api),
            logout: format!("{}/logout", api),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a QR image.
    ///
    /// Absolute `http(s)` references are used as-is; anything else is
    /// treated as an identifier under `/api/whatsapp/qr/`.
    pub fn qr_image(&self, reference: &str) -> String {
        let reference = reference.trim();
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        let reference = reference.trim_start_matches('/');
        format!(
            "{}/api/whatsapp/qr/{}",
            self.base_url,
            urlencoding::encode(reference)
        )
    }
}
