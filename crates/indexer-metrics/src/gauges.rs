use metrics::{describe_gauge, gauge};

/// Initialize gauge descriptions
pub fn init() {
    describe_gauge!(
        "indexer_queue_jobs",
        "Jobs per queue and state"
    );
    describe_gauge!(
        "indexer_bid_batch_size",
        "Bids buffered and not yet flushed"
    );
    describe_gauge!(
        "indexer_feed_connected",
        "1 while the order feed socket is joined"
    );
    describe_gauge!(
        "indexer_worker_in_flight",
        "Jobs currently running per queue"
    );
}

/// Set queue depth gauges
pub fn set_queue_depth(queue: &str, pending: usize, active: usize, parked: usize) {
    gauge!("indexer_queue_jobs", "queue" => queue.to_string(), "state" => "pending")
        .set(pending as f64);
    gauge!("indexer_queue_jobs", "queue" => queue.to_string(), "state" => "active")
        .set(active as f64);
    gauge!("indexer_queue_jobs", "queue" => queue.to_string(), "state" => "parked")
        .set(parked as f64);
}

pub fn set_bid_batch_size(count: usize) {
    gauge!("indexer_bid_batch_size").set(count as f64);
}

pub fn set_feed_connected(connected: bool) {
    gauge!("indexer_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

pub fn set_worker_in_flight(queue: &str, count: usize) {
    gauge!("indexer_worker_in_flight", "queue" => queue.to_string()).set(count as f64);
}
