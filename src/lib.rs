//! mempool-bridge
//!
//! Bridges one multiplexed upstream WebSocket feed (mempool.space) to many
//! downstream consumers. A single shared connection carries the union of
//! everything any consumer wants; a reference-counted subscription registry
//! decides when upstream interest must change; per-consumer bounded queues
//! fan events out without letting a slow consumer stall anyone else. The
//! connection task reconnects on its own with jittered exponential backoff
//! and replays live subscriptions, so consumers keep their streams across
//! upstream failures.
//!
//! The entry point is [`FeedBridge`]:
//!
//! ```no_run
//! use mempool_bridge::{BridgeConfig, ConsumerId, FeedBridge};
//!
//! # async fn run() -> mempool_bridge::Result<()> {
//! let bridge = FeedBridge::start(BridgeConfig::from_env());
//!
//! let consumer = ConsumerId::new(1);
//! let mut stream = bridge.subscribe(consumer, "blocks").await?;
//! bridge.subscribe(consumer, "stats").await?;
//!
//! while let Some(event) = stream.recv().await {
//!     println!("{}: {}", event.channel, event.payload);
//! }
//!
//! bridge.unsubscribe_all(consumer).await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod bridge;
pub mod channel;
pub mod config;
pub(crate) mod dispatch;
pub mod error;
pub mod feed;
pub mod registry;
pub mod session;

pub use backoff::BackoffPolicy;
pub use bridge::{BridgeStatus, FeedBridge};
pub use channel::{Channel, ConsumerId, Event};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use feed::ConnectionState;
pub use registry::SubscriptionRegistry;
pub use session::EventStream;
