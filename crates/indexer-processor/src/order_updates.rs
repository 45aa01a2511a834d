use indexer_core::types::OrderUpdateInfo;
use indexer_core::Result;
use indexer_queue::JobQueue;
use tracing::debug;

pub const ORDER_UPDATES_QUEUE: &str = "order-updates-by-id";

/// Trigger submission into the order mutation consumer
#[derive(Clone)]
pub struct OrderUpdatesQueue {
    queue: JobQueue<OrderUpdateInfo>,
}

impl OrderUpdatesQueue {
    pub fn new(queue: JobQueue<OrderUpdateInfo>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &JobQueue<OrderUpdateInfo> {
        &self.queue
    }

    /// Bulk-enqueue triggers keyed by their context. Entries pointing at the
    /// zero order id are dropped. Returns how many jobs were new.
    pub async fn add_to_queue(&self, infos: Vec<OrderUpdateInfo>) -> Result<usize> {
        let jobs: Vec<(String, OrderUpdateInfo)> = infos
            .into_iter()
            .filter(|info| {
                if info.has_zero_id() {
                    debug!(context = %info.context, "Dropping trigger for zero order id");
                    return false;
                }
                true
            })
            .map(|info| (info.context.clone(), info))
            .collect();

        if jobs.is_empty() {
            return Ok(0);
        }

        Ok(self.queue.add_bulk(jobs).await?)
    }
}
