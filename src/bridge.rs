//! Bridge service object
//!
//! [`FeedBridge`] wires the pieces together and is the only type most
//! callers need: it owns the subscription registry, the session table, the
//! fan-out dispatcher task, and the upstream connection task. The embedding
//! process creates one at startup and hands references to every
//! consumer-facing operation; there is no ambient global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};

use crate::channel::{Channel, ConsumerId};
use crate::config::BridgeConfig;
use crate::dispatch;
use crate::error::{BridgeError, Result};
use crate::feed::{ConnectionState, FeedConnection};
use crate::registry::SubscriptionRegistry;
use crate::session::{EventStream, SessionTable};

/// Point-in-time view of the bridge, for status surfaces
#[derive(Debug, Clone)]
pub struct BridgeStatus {
    /// Upstream connection state
    pub connection: ConnectionState,
    /// Number of channels with at least one subscriber
    pub live_channels: usize,
    /// Number of consumers holding at least one subscription
    pub consumers: usize,
}

/// The feed bridge: one upstream connection, many consumers
///
/// # Example
/// ```no_run
/// use mempool_bridge::{BridgeConfig, ConsumerId, FeedBridge};
///
/// # async fn example() -> mempool_bridge::Result<()> {
/// let bridge = FeedBridge::start(BridgeConfig::default());
///
/// let consumer = ConsumerId::new(1);
/// let mut blocks = bridge.subscribe(consumer, "blocks").await?;
/// while let Some(event) = blocks.recv().await {
///     println!("block event: {}", event.payload);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FeedBridge {
    registry: Arc<SubscriptionRegistry>,
    sessions: Arc<SessionTable>,
    feed: FeedConnection,
    /// Serializes subscription mutations against session teardown, so a
    /// subscribe racing an `unsubscribe_all` can never leave a registry
    /// entry behind a closed session. The dispatcher never takes this lock.
    lifecycle: Mutex<()>,
    closed: AtomicBool,
}

impl FeedBridge {
    /// Start the bridge: spawns the dispatcher and the upstream connection
    /// task, which begins connecting immediately. Subscriptions made while
    /// the link is still coming up are replayed the moment it connects.
    pub fn start(config: BridgeConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let sessions = Arc::new(SessionTable::new(config.queue_capacity));

        let (events_tx, events_rx) = mpsc::channel(config.dispatch_capacity);
        tokio::spawn(dispatch::run(
            events_rx,
            Arc::clone(&registry),
            Arc::clone(&sessions),
        ));

        let feed = FeedConnection::spawn(config, Arc::clone(&registry), events_tx);

        Self {
            registry,
            sessions,
            feed,
            lifecycle: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe `consumer` to the channel named by `descriptor`.
    ///
    /// Returns the consumer's event stream; all channels of one consumer
    /// share the same stream. Idempotent: subscribing to an already-held
    /// channel just returns the stream again. Malformed descriptors are
    /// rejected synchronously without touching any state.
    pub async fn subscribe(&self, consumer: ConsumerId, descriptor: &str) -> Result<EventStream> {
        let channel = Channel::parse(descriptor)?;

        let _lifecycle = self.lifecycle.lock().await;
        self.ensure_open()?;
        let queue = self.sessions.get_or_create(consumer).await;
        let was_first = self.registry.add(consumer, channel.clone()).await;

        if was_first {
            tracing::info!(consumer = %consumer, channel = %channel, "Channel went live");
            match channel.address() {
                Some(address) => self.feed.track(address.to_string()).await,
                None => self.feed.sync_want().await,
            }
        }

        Ok(EventStream::new(queue))
    }

    /// Drop `consumer`'s interest in the channel named by `descriptor`.
    ///
    /// Idempotent: unsubscribing from a channel that is not held is a
    /// no-op, not an error.
    pub async fn unsubscribe(&self, consumer: ConsumerId, descriptor: &str) -> Result<()> {
        let channel = Channel::parse(descriptor)?;

        let _lifecycle = self.lifecycle.lock().await;
        self.ensure_open()?;
        let was_last = self.registry.remove(consumer, &channel).await;
        if was_last && channel.is_simple() {
            // Re-declare the full set without this channel. Dropped tracked
            // addresses need no frame: the upstream has no untrack
            // primitive, so their events simply stop being routed.
            self.feed.sync_want().await;
        }
        Ok(())
    }

    /// Tear down `consumer`'s session: release every subscription it holds
    /// in one atomic sweep and close its event stream.
    ///
    /// Safe to call more than once; reference counts are released exactly
    /// once. Call this when the consumer's own transport disconnects.
    pub async fn unsubscribe_all(&self, consumer: ConsumerId) {
        let _lifecycle = self.lifecycle.lock().await;
        let went_quiet = self.registry.remove_all(consumer).await;

        if let Some(queue) = self.sessions.remove(consumer).await {
            queue.close().await;
        }

        if went_quiet.iter().any(Channel::is_simple) {
            self.feed.sync_want().await;
        }
    }

    /// Current upstream connection state
    pub fn connection_status(&self) -> ConnectionState {
        self.feed.status()
    }

    /// Watch receiver tracking upstream connection state changes
    pub fn status_changes(&self) -> watch::Receiver<ConnectionState> {
        self.feed.watch_status()
    }

    /// Snapshot of the bridge for status/health surfaces
    pub async fn status(&self) -> BridgeStatus {
        BridgeStatus {
            connection: self.feed.status(),
            live_channels: self.registry.channel_count().await,
            consumers: self.registry.consumer_count().await,
        }
    }

    /// Shut the bridge down: stop the upstream task (canceling any pending
    /// retry timer with it) and close every consumer session. The
    /// dispatcher drains out once the connection task drops its sender.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down feed bridge");
        self.feed.shutdown().await;
        self.sessions.close_all().await;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BridgeError::Closed)
        } else {
            Ok(())
        }
    }
}
