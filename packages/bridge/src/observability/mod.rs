// packages/bridge/src/observability/mod.rs
//! Logging and metrics setup
//!
//! Tracing goes through `tracing-subscriber` with `RUST_LOG` taking
//! precedence over the configured level. Metrics are exported in Prometheus
//! format when a listen address is configured; otherwise the `metrics`
//! macros are no-ops.

use crate::utils::errors::{BridgeError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,

    pub log_format: LogFormat,

    /// Prometheus scrape address
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_addr: None,
        }
    }
}

impl ObservabilityConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }
}

/// Install the global tracing subscriber
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_target(true);

    let result = match config.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| BridgeError::Observability(format!("Failed to init tracing: {}", e)))
}

/// Install the Prometheus exporter if `metrics_addr` is set
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = config.metrics_addr.as_deref() else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| BridgeError::Config(format!("Invalid metrics address {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| BridgeError::Observability(format!("Failed to install exporter: {}", e)))?;

    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}
