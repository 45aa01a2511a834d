//! Order mutation consumer: reloads order state for each trigger, recomputes
//! derived caches, appends the sell-side ledger and fans out notifications.

pub mod cache;
mod handlers;
mod order_updates;
pub mod sinks;
pub mod storage;

pub use cache::{CacheRecompute, CacheTarget, DerivedCacheQueue, DERIVED_CACHE_QUEUE};
pub use handlers::OrderUpdatesByIdHandler;
pub use order_updates::{OrderUpdatesQueue, ORDER_UPDATES_QUEUE};
pub use sinks::RedisSink;
pub use storage::{OrderEventWriter, OrderReader, PgOrderStore};
