//! Prometheus export for engine and HTTP metrics.
//!
//! The engine crate records rounds, bets, effects and scheduler failures
//! through the `metrics` facade. This module installs the exporter that
//! serves them and adds the HTTP-level series.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use dice_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", 200);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Errors
///
/// Fails if the listener cannot be set up or a recorder is already installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// Labelled by method and status only; paths carry room ids.
pub fn http_requests_total(method: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Channel Metrics
// ============================================================================

/// Count Bot API failures by error class.
pub fn telegram_errors_total(class: &'static str) {
    metrics::counter!("telegram_errors_total", "class" => class).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        http_requests_total("GET", 200);
        http_request_duration_ms("GET", 1.5);
        telegram_errors_total("network");
    }
}
