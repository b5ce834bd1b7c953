//! Upstream wire frames
//!
//! Outbound control frames and inbound frame classification for the
//! mempool.space WebSocket protocol. Outbound subscriptions are declared
//! with a `want` frame carrying the FULL desired simple-channel set (not a
//! delta), plus one `track-address` frame per tracked address. The upstream
//! offers no untrack primitive; a dropped address simply stops being routed.

use serde::Serialize;
use serde_json::Value;

use crate::channel::Channel;

/// Declares the full desired set of simple channels
#[derive(Debug, Serialize)]
pub struct WantFrame {
    action: &'static str,
    data: Vec<String>,
}

impl WantFrame {
    /// Build a `want` frame from the live simple-channel names.
    ///
    /// An empty list is meaningful: it tells the upstream no simple channel
    /// is wanted anymore.
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action: "want",
            data: channels.into_iter().map(Into::into).collect(),
        }
    }

    /// Serialize to the wire text
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).expect("want frame serialization cannot fail")
    }
}

/// Adds one parameterized address subscription
#[derive(Debug, Serialize)]
pub struct TrackAddressFrame {
    #[serde(rename = "track-address")]
    address: String,
}

impl TrackAddressFrame {
    /// Build a `track-address` frame
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Serialize to the wire text
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).expect("track-address frame serialization cannot fail")
    }
}

/// Classify an inbound frame by the channel it belongs to.
///
/// Inbound frames are JSON objects keyed by channel name; the payload shape
/// is channel-specific and opaque to the bridge. Unknown keys yield `None`
/// and the frame is ignored, never fatal.
pub fn classify(frame: &Value) -> Option<Channel> {
    let object = frame.as_object()?;

    if object.contains_key("block") {
        return Some(Channel::Blocks);
    }
    if object.contains_key("mempool-blocks") {
        return Some(Channel::MempoolBlocks);
    }
    if object.contains_key("mempoolInfo") {
        return Some(Channel::Stats);
    }
    if object.contains_key("live-2h-chart") {
        return Some(Channel::Live2hChart);
    }
    // Address events carry the tracked address, which is part of the
    // channel identity.
    if let Some(address) = object.get("address").and_then(Value::as_str) {
        return Some(Channel::TrackAddress(address.to_string()));
    }

    None
}
