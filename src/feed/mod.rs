//! Upstream connection management
//!
//! One background task owns the single physical WebSocket to the upstream
//! feed: it connects, replays the registry's live channel set, decodes
//! inbound frames into events for the dispatcher, probes liveness with
//! pings, and on any failure walks the backoff policy and reconnects.
//! Consumers never see upstream failures, only a delivery gap, observable
//! through [`ConnectionState`].

pub mod conn;
pub mod frame;

use std::time::Duration;

pub use conn::FeedConnection;

/// Connection state of the upstream link
///
/// Exactly one instance exists per bridge, published through a `watch`
/// channel. Transitions are monotonic within a reconnect cycle:
/// `Disconnected → Connecting → Connected | Backoff → Connecting → …`;
/// a connected link only leaves `Connected` through a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not retrying (initial state, or shut down)
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// The link is up and subscriptions are replayed
    Connected,
    /// Waiting out the delay before reconnect attempt `attempt`
    Backoff {
        /// Number of consecutive failed cycles, 1-based
        attempt: u32,
        /// Jittered delay being waited out
        delay: Duration,
    },
}

impl ConnectionState {
    /// Whether the upstream link is currently usable
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff { attempt, delay } => {
                write!(f, "backoff (attempt {}, {:?})", attempt, delay)
            }
        }
    }
}

/// Commands from the bridge API to the connection task
#[derive(Debug)]
pub(crate) enum FeedCommand {
    /// Re-send the full desired simple-channel set (a 0→1 or 1→0 edge)
    SyncWant,
    /// Declare a newly tracked address
    Track(String),
    /// Close the link and stop the task, canceling any retry timer
    Shutdown,
}
