//! Subscription registry for channel interest bookkeeping
//!
//! The registry is the single source of truth for "what should be
//! subscribed upstream": it reference-counts consumer interest per channel
//! and records which channels each consumer holds. The upstream connection
//! never tracks subscriptions on its own; on every (re)connect it replays
//! whatever the registry says is live, so resubscription cannot drift from
//! consumer reality.
//!
//! # Architecture
//!
//! ```text
//!                  Arc<SubscriptionRegistry>
//!             ┌───────────────────────────────┐
//!             │ channel  → {consumer ids}     │
//!             │ consumer → {channels}         │
//!             └──────────────┬────────────────┘
//!                            │
//!      ┌─────────────────────┼──────────────────────┐
//!      ▼                     ▼                      ▼
//! [Bridge API]         [Dispatcher]          [Upstream conn]
//! add()/remove()       subscribers_of()      live_simple_names()
//! 0→1 / 1→0 edges      per-event snapshot    live_addresses()
//! drive want/track                           replayed on connect
//! ```

pub mod store;

pub use store::SubscriptionRegistry;
