use async_trait::async_trait;
use indexer_core::types::{Order, OrderEvent};
use indexer_core::Result;
use indexer_db::models::DbOrderEvent;
use indexer_db::repositories::{OrderEventRepository, OrderRepository};
use indexer_db::DatabasePool;
use std::sync::Arc;

/// Read access to authoritative order state
#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn order_by_id(&self, id: &str) -> Result<Option<Order>>;
}

/// Append-only order-event ledger
#[async_trait]
pub trait OrderEventWriter: Send + Sync {
    /// Returns false when the event's context already has a row for the order
    async fn append(&self, event: &OrderEvent) -> Result<bool>;
}

/// Postgres-backed order reads and ledger writes
pub struct PgOrderStore {
    db: Arc<DatabasePool>,
}

impl PgOrderStore {
    pub fn new(db: Arc<DatabasePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderReader for PgOrderStore {
    async fn order_by_id(&self, id: &str) -> Result<Option<Order>> {
        match OrderRepository::get_by_id(self.db.inner(), id).await? {
            Some(row) => Ok(Some(Order::try_from(row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderEventWriter for PgOrderStore {
    async fn append(&self, event: &OrderEvent) -> Result<bool> {
        let inserted =
            OrderEventRepository::insert(self.db.inner(), &DbOrderEvent::from(event)).await?;
        Ok(inserted)
    }
}
