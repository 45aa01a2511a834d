use serde::Deserialize;

/// Prometheus scrape endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Off unless `METRICS_ENABLED=true` or a port is configured
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9091
}

impl MetricsConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("METRICS_PORT").ok().and_then(|s| s.trim().parse().ok());
        let enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(port.is_some());

        Self {
            enabled,
            host: std::env::var("METRICS_HOST").unwrap_or_else(|_| default_host()),
            port: port.unwrap_or_else(default_port),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
