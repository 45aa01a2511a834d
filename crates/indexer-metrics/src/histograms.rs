use metrics::{describe_histogram, histogram};
use std::time::Duration;

/// Initialize histogram descriptions
pub fn init() {
    describe_histogram!(
        "indexer_job_duration_seconds",
        "Time to run a single queue job"
    );
    describe_histogram!(
        "indexer_order_latency_seconds",
        "Time from order origination to first indexing"
    );
    describe_histogram!(
        "indexer_bid_batch_flush_duration_seconds",
        "Time to hand a bid batch to intake"
    );
    describe_histogram!(
        "indexer_redis_publish_duration_seconds",
        "Time for Redis publish operations"
    );
}

/// Record job duration
pub fn job_duration(queue: &str, duration: Duration) {
    histogram!("indexer_job_duration_seconds", "queue" => queue.to_string())
        .record(duration.as_secs_f64());
}

/// Record origination-to-indexing latency of a new order
pub fn order_latency(source: &str, order_type: &str, duration: Duration) {
    histogram!(
        "indexer_order_latency_seconds",
        "source" => source.to_string(),
        "order_type" => order_type.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn bid_batch_flush_duration(duration: Duration) {
    histogram!("indexer_bid_batch_flush_duration_seconds").record(duration.as_secs_f64());
}

/// Record Redis publish duration
pub fn redis_publish_duration(duration: Duration) {
    histogram!("indexer_redis_publish_duration_seconds").record(duration.as_secs_f64());
}
