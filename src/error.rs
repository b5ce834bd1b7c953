//! Bridge error types
//!
//! Errors surfaced synchronously to callers of the bridge API. Upstream
//! transport failures are never represented here; they are absorbed by the
//! reconnect loop and observable only through the connection status.

/// Error type for bridge operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Channel descriptor names an unknown channel kind
    UnknownChannel(String),
    /// Tracked-address parameter is syntactically invalid
    InvalidAddress(String),
    /// The bridge has been shut down
    Closed,
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::UnknownChannel(descriptor) => {
                write!(f, "Unknown channel: {}", descriptor)
            }
            BridgeError::InvalidAddress(address) => {
                write!(f, "Invalid address: {}", address)
            }
            BridgeError::Closed => write!(f, "Bridge is shut down"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Convenience result alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
