//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Inbox Metrics
    pub static ref INBOX_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("apinbox_inbox_requests_total", "Total number of inbox requests"),
        &["status"]
    ).expect("metric can be created");
    pub static ref INBOX_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "apinbox_inbox_request_duration_seconds",
            "Inbox request duration in seconds"
        ).buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["status"]
    ).expect("metric can be created");
    pub static ref ACTIVITIES_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("apinbox_activities_received_total", "Total number of activities stored"),
        &["activity_type"]
    ).expect("metric can be created");

    // Actor Metrics
    pub static ref ACTOR_RESOLUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("apinbox_actor_resolutions_total", "Actor find-or-create outcomes"),
        &["result"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("apinbox_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INBOX_REQUESTS_TOTAL.clone()))
            .expect("INBOX_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(INBOX_REQUEST_DURATION_SECONDS.clone()))
            .expect("INBOX_REQUEST_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(ACTIVITIES_RECEIVED_TOTAL.clone()))
            .expect("ACTIVITIES_RECEIVED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ACTOR_RESOLUTIONS_TOTAL.clone()))
            .expect("ACTOR_RESOLUTIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Record the outcome of one inbox request.
pub fn observe_inbox_request(status: u16, elapsed: std::time::Duration) {
    let status = status.to_string();
    INBOX_REQUESTS_TOTAL.with_label_values(&[&status]).inc();
    INBOX_REQUEST_DURATION_SECONDS
        .with_label_values(&[&status])
        .observe(elapsed.as_secs_f64());
}
