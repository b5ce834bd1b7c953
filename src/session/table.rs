//! Session table
//!
//! Maps consumer ids to their delivery queues. A session is created on the
//! consumer's first subscribe; `remove` hands the queue back exactly once,
//! which is what makes closing a session idempotent at the bridge level.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::channel::ConsumerId;

use super::queue::DeliveryQueue;

/// All live consumer sessions
pub struct SessionTable {
    sessions: RwLock<HashMap<ConsumerId, Arc<DeliveryQueue>>>,
    queue_capacity: usize,
}

impl SessionTable {
    /// Create an empty table; every queue it creates uses `queue_capacity`
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Queue for `consumer`, creating the session on first use
    pub async fn get_or_create(&self, consumer: ConsumerId) -> Arc<DeliveryQueue> {
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(consumer)
                .or_insert_with(|| Arc::new(DeliveryQueue::new(self.queue_capacity))),
        )
    }

    /// Queue for `consumer`, if the session exists
    pub async fn get(&self, consumer: ConsumerId) -> Option<Arc<DeliveryQueue>> {
        self.sessions.read().await.get(&consumer).cloned()
    }

    /// Take the session out of the table.
    ///
    /// Returns the queue only to the first caller; later calls get `None`,
    /// so teardown runs exactly once per session.
    pub async fn remove(&self, consumer: ConsumerId) -> Option<Arc<DeliveryQueue>> {
        self.sessions.write().await.remove(&consumer)
    }

    /// Close every session (bridge shutdown)
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (consumer, queue) in drained {
            tracing::debug!(consumer = %consumer, "Closing session");
            queue.close().await;
        }
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are live
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
