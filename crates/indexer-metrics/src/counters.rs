use metrics::{counter, describe_counter};

/// Initialize counter descriptions
pub fn init() {
    describe_counter!(
        "indexer_feed_events_received_total",
        "Stream events received from the order feed"
    );
    describe_counter!(
        "indexer_feed_events_deduplicated_total",
        "Stream events dropped as duplicates"
    );
    describe_counter!(
        "indexer_feed_events_dropped_total",
        "Stream events dropped before submission"
    );
    describe_counter!(
        "indexer_orders_submitted_total",
        "Orders handed to intake"
    );
    describe_counter!(
        "indexer_triggers_enqueued_total",
        "Order update triggers accepted by a queue"
    );
    describe_counter!(
        "indexer_jobs_completed_total",
        "Queue jobs that ran successfully"
    );
    describe_counter!(
        "indexer_jobs_failed_total",
        "Queue job runs that returned an error"
    );
    describe_counter!(
        "indexer_jobs_parked_total",
        "Queue jobs parked after exhausting their attempts"
    );
    describe_counter!(
        "indexer_jobs_recovered_total",
        "Queue jobs returned to pending after their lease expired"
    );
    describe_counter!(
        "indexer_order_events_total",
        "Order event rows written"
    );
    describe_counter!(
        "indexer_activities_published_total",
        "Activity records published"
    );
    describe_counter!(
        "indexer_websocket_events_total",
        "Websocket order events published"
    );
    describe_counter!(
        "indexer_metadata_updates_total",
        "Token metadata updates forwarded"
    );
    describe_counter!(
        "indexer_errors_total",
        "Total number of errors"
    );
}

pub fn feed_events_received(event_type: &str) {
    counter!("indexer_feed_events_received_total", "event_type" => event_type.to_string())
        .increment(1);
}

pub fn feed_events_deduplicated() {
    counter!("indexer_feed_events_deduplicated_total").increment(1);
}

/// Increment dropped events counter
pub fn feed_events_dropped(reason: &str) {
    counter!("indexer_feed_events_dropped_total", "reason" => reason.to_string()).increment(1);
}

pub fn orders_submitted(count: u64, kind: &str) {
    counter!("indexer_orders_submitted_total", "kind" => kind.to_string()).increment(count);
}

pub fn triggers_enqueued(queue: &str, count: u64) {
    counter!("indexer_triggers_enqueued_total", "queue" => queue.to_string()).increment(count);
}

pub fn jobs_completed(queue: &str) {
    counter!("indexer_jobs_completed_total", "queue" => queue.to_string()).increment(1);
}

pub fn jobs_failed(queue: &str) {
    counter!("indexer_jobs_failed_total", "queue" => queue.to_string()).increment(1);
}

pub fn jobs_parked(queue: &str) {
    counter!("indexer_jobs_parked_total", "queue" => queue.to_string()).increment(1);
}

pub fn jobs_recovered(queue: &str, count: u64) {
    counter!("indexer_jobs_recovered_total", "queue" => queue.to_string()).increment(count);
}

pub fn order_events_written(status: &str) {
    counter!("indexer_order_events_total", "status" => status.to_string()).increment(1);
}

pub fn activities_published(kind: &str) {
    counter!("indexer_activities_published_total", "kind" => kind.to_string()).increment(1);
}

pub fn websocket_events_published(kind: &str) {
    counter!("indexer_websocket_events_total", "kind" => kind.to_string()).increment(1);
}

pub fn metadata_updates() {
    counter!("indexer_metadata_updates_total").increment(1);
}

/// Increment errors counter
pub fn errors(count: u64, error_type: &str) {
    counter!("indexer_errors_total", "type" => error_type.to_string()).increment(count);
}
