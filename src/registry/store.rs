//! Subscription registry implementation

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::channel::{Channel, ConsumerId};

/// Reference-counted channel interest, shared between the bridge API, the
/// fan-out dispatcher, and the upstream connection.
///
/// Both maps live under a single `RwLock` so every mutation is atomic with
/// respect to concurrent reads: a reader can never observe a live channel
/// with zero subscribers or a subscriber missing from its channel set. No
/// await point is ever held across the lock.
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// Channel to interested consumers
    channel_subscribers: HashMap<Channel, HashSet<ConsumerId>>,
    /// Consumer to the channels it holds
    consumer_channels: HashMap<ConsumerId, HashSet<Channel>>,
}

impl RegistryInner {
    fn check_consistency(&self) {
        // Both maps describe the same relation; divergence is an internal
        // defect and must fail fast in development builds.
        debug_assert!(
            self.channel_subscribers.values().all(|s| !s.is_empty()),
            "registry holds a live channel with zero subscribers"
        );
        debug_assert!(
            self.consumer_channels.values().all(|s| !s.is_empty()),
            "registry holds a consumer with zero channels"
        );
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register interest of `consumer` in `channel`.
    ///
    /// Returns `true` if this was the channel's first subscriber (0→1
    /// transition), in which case the caller must trigger the upstream
    /// subscribe. Subscribing to an already-held channel is a no-op that
    /// returns `false`.
    pub async fn add(&self, consumer: ConsumerId, channel: Channel) -> bool {
        let mut inner = self.inner.write().await;

        inner
            .consumer_channels
            .entry(consumer)
            .or_default()
            .insert(channel.clone());

        let subscribers = inner.channel_subscribers.entry(channel.clone()).or_default();
        subscribers.insert(consumer);
        let was_first = subscribers.len() == 1;

        inner.check_consistency();
        tracing::debug!(
            consumer = %consumer,
            channel = %channel,
            first = was_first,
            "Subscription added"
        );
        was_first
    }

    /// Drop interest of `consumer` in `channel`.
    ///
    /// Returns `true` if this was the channel's last subscriber (1→0
    /// transition), in which case the caller must trigger the upstream
    /// unsubscribe. Removing a subscription that was never held is a no-op
    /// that returns `false`.
    pub async fn remove(&self, consumer: ConsumerId, channel: &Channel) -> bool {
        let mut inner = self.inner.write().await;
        let was_last = remove_locked(&mut inner, consumer, channel);
        inner.check_consistency();
        if was_last {
            tracing::debug!(consumer = %consumer, channel = %channel, "Channel went quiet");
        }
        was_last
    }

    /// Remove every channel `consumer` holds, in one atomic sweep.
    ///
    /// Returns the channels whose subscriber count dropped to zero, so the
    /// caller can batch the resulting upstream unsubscribes. Safe to call
    /// for an unknown consumer.
    pub async fn remove_all(&self, consumer: ConsumerId) -> Vec<Channel> {
        let mut inner = self.inner.write().await;

        let channels = match inner.consumer_channels.get(&consumer) {
            Some(held) => held.iter().cloned().collect::<Vec<_>>(),
            None => return Vec::new(),
        };

        let mut went_quiet = Vec::new();
        for channel in channels {
            if remove_locked(&mut inner, consumer, &channel) {
                went_quiet.push(channel);
            }
        }

        inner.check_consistency();
        tracing::info!(
            consumer = %consumer,
            released = went_quiet.len(),
            "Consumer subscriptions released"
        );
        went_quiet
    }

    /// Consumers currently interested in `channel` (consistent snapshot)
    pub async fn subscribers_of(&self, channel: &Channel) -> Vec<ConsumerId> {
        let inner = self.inner.read().await;
        inner
            .channel_subscribers
            .get(channel)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `consumer` currently holds `channel`
    pub async fn contains(&self, consumer: ConsumerId, channel: &Channel) -> bool {
        let inner = self.inner.read().await;
        inner
            .consumer_channels
            .get(&consumer)
            .is_some_and(|held| held.contains(channel))
    }

    /// Every channel with at least one subscriber
    pub async fn live_channels(&self) -> Vec<Channel> {
        let inner = self.inner.read().await;
        inner.channel_subscribers.keys().cloned().collect()
    }

    /// Wire names of the live simple channels, for the `want` frame.
    ///
    /// Sorted so the frame contents are deterministic.
    pub async fn live_simple_names(&self) -> Vec<&'static str> {
        let inner = self.inner.read().await;
        let mut names: Vec<&'static str> = inner
            .channel_subscribers
            .keys()
            .filter_map(Channel::wire_name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Live tracked addresses, for per-address subscribe frames on reconnect
    pub async fn live_addresses(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut addresses: Vec<String> = inner
            .channel_subscribers
            .keys()
            .filter_map(|c| c.address().map(str::to_string))
            .collect();
        addresses.sort_unstable();
        addresses
    }

    /// Number of live channels
    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.channel_subscribers.len()
    }

    /// Number of consumers holding at least one subscription
    pub async fn consumer_count(&self) -> usize {
        self.inner.read().await.consumer_channels.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared removal path for `remove` and `remove_all`; returns whether the
/// channel's count reached zero.
fn remove_locked(inner: &mut RegistryInner, consumer: ConsumerId, channel: &Channel) -> bool {
    if let Some(held) = inner.consumer_channels.get_mut(&consumer) {
        held.remove(channel);
        if held.is_empty() {
            inner.consumer_channels.remove(&consumer);
        }
    }

    match inner.channel_subscribers.get_mut(channel) {
        Some(subscribers) => {
            let removed = subscribers.remove(&consumer);
            if removed && subscribers.is_empty() {
                inner.channel_subscribers.remove(channel);
                true
            } else {
                false
            }
        }
        None => false,
    }
}
