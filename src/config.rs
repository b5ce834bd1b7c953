//! Bridge configuration

use std::time::Duration;

/// Default upstream feed endpoint
pub const DEFAULT_WS_URL: &str = "wss://mempool.space/api/v1/ws";

/// Bridge configuration options
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Upstream WebSocket endpoint
    pub ws_url: String,

    /// Idle interval after which a keepalive ping is sent
    pub keepalive_interval: Duration,

    /// Deadline for any inbound frame after a ping; exceeding it is a
    /// connection failure
    pub keepalive_timeout: Duration,

    /// Base delay of the exponential reconnect backoff
    pub backoff_base: Duration,

    /// Cap on the reconnect backoff delay
    pub backoff_max: Duration,

    /// How long a connection must stay open before the failure counter
    /// resets (distinguishes flapping links from stable ones)
    pub stability_grace: Duration,

    /// Per-consumer delivery queue capacity; when full, the oldest queued
    /// event is dropped in favor of the newest
    pub queue_capacity: usize,

    /// Capacity of the decoded-event channel between the receive loop and
    /// the dispatcher
    pub dispatch_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            stability_grace: Duration::from_secs(30),
            queue_capacity: 256,
            dispatch_capacity: 1024,
        }
    }
}

impl BridgeConfig {
    /// Create a config pointing at a custom upstream endpoint
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            ws_url: url.into(),
            ..Default::default()
        }
    }

    /// Build a config from the process environment, falling back to
    /// defaults for anything unset: `MEMPOOL_WS_URL`, `WS_PING_INTERVAL`
    /// (seconds), `WS_PING_TIMEOUT` (seconds), `MAX_MESSAGE_QUEUE_SIZE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("MEMPOOL_WS_URL") {
            config.ws_url = url;
        }
        if let Some(secs) = env_u64("WS_PING_INTERVAL") {
            config.keepalive_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("WS_PING_TIMEOUT") {
            config.keepalive_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = env_u64("MAX_MESSAGE_QUEUE_SIZE") {
            config.queue_capacity = size as usize;
        }
        config
    }

    /// Set the upstream endpoint
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the keepalive ping interval
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the keepalive response timeout
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    /// Set the reconnect backoff range
    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Set the stability grace period for failure-counter reset
    pub fn stability_grace(mut self, grace: Duration) -> Self {
        self.stability_grace = grace;
        self
    }

    /// Set the per-consumer delivery queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}
