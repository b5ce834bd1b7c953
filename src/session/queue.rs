//! Bounded per-consumer delivery queue
//!
//! The pull-driven, cancellable stream contract is implemented as a bounded
//! queue with an explicit close signal: the dispatcher pushes without ever
//! blocking, the consumer suspends on `recv` until an item or the close
//! arrives, and closing promptly interrupts a blocked `recv`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::channel::Event;

/// Bounded FIFO of pending events for one consumer
pub struct DeliveryQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

struct QueueInner {
    items: VecDeque<Event>,
    closed: bool,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` pending events
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.max(1)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without blocking.
    ///
    /// When the queue is full the oldest pending event is discarded in
    /// favor of the new one and the dropped counter is bumped; a stalled
    /// consumer loses history, never the producer's time. Pushes to a
    /// closed queue are silently ignored.
    pub async fn push(&self, event: Event) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(channel = %event.channel, "Delivery queue full, dropped oldest event");
        }
        inner.items.push_back(event);
        drop(inner);
        self.notify.notify_one();
    }

    /// Dequeue the next event, suspending while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            // Register the waiter before checking, so a push landing
            // between the check and the await still wakes us.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(event) = inner.items.pop_front() {
                    return Some(event);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue, waking any blocked `recv`.
    ///
    /// Already-queued events remain readable; safe to call more than once.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Events dropped so far due to backpressure
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of events currently pending
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Whether the queue holds no pending events
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Consumer-facing handle for draining a session's delivery queue
///
/// Returned by every subscribe call of the same consumer; all of that
/// consumer's channels flow through the one underlying queue.
pub struct EventStream {
    queue: Arc<DeliveryQueue>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl EventStream {
    pub(crate) fn new(queue: Arc<DeliveryQueue>) -> Self {
        Self { queue }
    }

    /// Next event, or `None` once the session is closed and drained
    pub async fn recv(&mut self) -> Option<Event> {
        self.queue.recv().await
    }

    /// Events dropped for this consumer due to backpressure
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }
}
