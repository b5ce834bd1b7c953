//! Consumer sessions and event delivery
//!
//! Each downstream consumer owns one bounded [`DeliveryQueue`], created on
//! its first subscribe and closed exactly once when the consumer goes away.
//! All channels a consumer subscribes to feed the same queue; the consumer
//! drains it through an [`EventStream`]. The queue favors freshness over
//! completeness: when full, the oldest event is dropped and counted.

pub mod queue;
pub mod table;

pub use queue::{DeliveryQueue, EventStream};
pub use table::SessionTable;
