pub mod config;
pub mod counters;
pub mod gauges;
pub mod histograms;
pub mod server;

pub use config::MetricsConfig;
pub use server::MetricsServer;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Server error: {0}")]
    Server(String),

    #[error("Recorder error: {0}")]
    Recorder(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Install the global Prometheus recorder and describe every metric.
/// The returned handle renders the scrape output for [`MetricsServer`].
pub fn init() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Recorder(e.to_string()))?;

    counters::init();
    gauges::init();
    histograms::init();

    Ok(handle)
}
