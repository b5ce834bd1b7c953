//! Channel and event types
//!
//! A [`Channel`] identifies one logical stream within the multiplexed
//! upstream feed. Simple channels form a fixed set; tracked addresses are
//! parameterized, so two different addresses are two independent channels
//! with independent subscriber counts.

use std::time::Instant;

use serde_json::Value;

use crate::error::BridgeError;

/// Descriptor prefix for parameterized address channels
pub const TRACK_ADDRESS_PREFIX: &str = "track-address:";

/// Identifies one downstream consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Create a consumer id
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// A logical stream exposed by the upstream feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Newly mined blocks
    Blocks,
    /// Projected mempool block templates
    MempoolBlocks,
    /// Mempool summary statistics
    Stats,
    /// Rolling two-hour fee chart
    Live2hChart,
    /// Transactions touching one tracked address
    TrackAddress(String),
}

impl Channel {
    /// Parse a channel descriptor as accepted by the subscribe API.
    ///
    /// Simple channels are named by their upstream wire name; tracked
    /// addresses use the `track-address:<address>` form. Rejects unknown
    /// kinds and malformed addresses without touching any state.
    pub fn parse(descriptor: &str) -> Result<Self, BridgeError> {
        match descriptor {
            "blocks" => Ok(Channel::Blocks),
            "mempool-blocks" => Ok(Channel::MempoolBlocks),
            "stats" => Ok(Channel::Stats),
            "live-2h-chart" => Ok(Channel::Live2hChart),
            other => {
                if let Some(address) = other.strip_prefix(TRACK_ADDRESS_PREFIX) {
                    validate_address(address)?;
                    Ok(Channel::TrackAddress(address.to_string()))
                } else {
                    Err(BridgeError::UnknownChannel(other.to_string()))
                }
            }
        }
    }

    /// Upstream wire name for simple channels; `None` for tracked addresses,
    /// which are declared with their own frame rather than the `want` list.
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            Channel::Blocks => Some("blocks"),
            Channel::MempoolBlocks => Some("mempool-blocks"),
            Channel::Stats => Some("stats"),
            Channel::Live2hChart => Some("live-2h-chart"),
            Channel::TrackAddress(_) => None,
        }
    }

    /// Whether this is a fixed (non-parameterized) channel
    pub fn is_simple(&self) -> bool {
        !matches!(self, Channel::TrackAddress(_))
    }

    /// The tracked address, if this is an address channel
    pub fn address(&self) -> Option<&str> {
        match self {
            Channel::TrackAddress(address) => Some(address),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::TrackAddress(address) => write!(f, "{}{}", TRACK_ADDRESS_PREFIX, address),
            simple => write!(f, "{}", simple.wire_name().unwrap_or("?")),
        }
    }
}

/// Syntactic address check: length and alphabet only.
///
/// Full validation belongs to the upstream; this exists so an obviously
/// malformed parameter is rejected synchronously before any registry
/// mutation or upstream frame.
fn validate_address(address: &str) -> Result<(), BridgeError> {
    let plausible = (26..=90).contains(&address.len())
        && address.chars().all(|c| c.is_ascii_alphanumeric());
    if plausible {
        Ok(())
    } else {
        Err(BridgeError::InvalidAddress(address.to_string()))
    }
}

/// One decoded upstream event
///
/// The payload is opaque to the bridge; only the channel is interpreted,
/// for routing.
#[derive(Debug, Clone)]
pub struct Event {
    /// Channel this event belongs to
    pub channel: Channel,
    /// Channel-shaped payload as received from upstream
    pub payload: Value,
    /// When the upstream connection received the frame
    pub received_at: Instant,
}

impl Event {
    /// Create an event stamped with the current instant
    pub fn new(channel: Channel, payload: Value) -> Self {
        Self {
            channel,
            payload,
            received_at: Instant::now(),
        }
    }
}
