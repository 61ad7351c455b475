//! Prometheus metrics for the DNS operator
//!
//! Counters and histograms for reconciles, handler outcomes and router
//! calls, plus the HTTP server that exposes them.

mod server;

pub use server::serve;

use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "pikube_dns_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "pikube_dns_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "pikube_dns_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Handler results by classification
    pub static ref RECONCILE_OUTCOMES: CounterVec = register_counter_vec!(
        "pikube_dns_operator_reconcile_outcomes_total",
        "Handler results by handler and outcome",
        &["handler", "outcome"]
    ).unwrap();

    /// Calls made to the router REST API
    pub static ref ROUTER_REQUESTS: CounterVec = register_counter_vec!(
        "pikube_dns_operator_router_requests_total",
        "Router static DNS API requests by operation and result",
        &["operation", "result"]
    ).unwrap();

    /// Total number of cleanup operations
    pub static ref CLEANUPS: CounterVec = register_counter_vec!(
        "pikube_dns_operator_cleanups_total",
        "Total number of cleanup operations",
        &["kind"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "pikube_dns_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}
