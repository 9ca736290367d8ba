//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_reconcile_total` (counter): applied events by op and result
//! - `gateway_routes` (gauge): entries in the route table
//! - `gateway_services` (gauge): services registered with the gateway
//! - `gateway_endpoints_written_total` (counter): record writes by op

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const RECONCILE_TOTAL: &str = "gateway_reconcile_total";
pub const ROUTES: &str = "gateway_routes";
pub const SERVICES: &str = "gateway_services";
pub const ENDPOINTS_WRITTEN_TOTAL: &str = "gateway_endpoints_written_total";

/// Install the Prometheus recorder and its scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_counter!(RECONCILE_TOTAL, "Change events applied by the reconciler");
            describe_gauge!(ROUTES, "Entries in the route table");
            describe_gauge!(SERVICES, "Services registered with the gateway");
            describe_counter!(ENDPOINTS_WRITTEN_TOTAL, "Endpoint record writes");
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}
