//! Prometheus metrics for the dispatch service.
//!
//! - Send metrics (accepted, rejected by validation, failed on persistence)
//! - Channel fan-out metrics
//! - In-app store writes by mode and state transition
//! - External transport outcomes

mod helpers;

pub use helpers::{encode_metrics, DispatchMetrics, StoreMetrics, TransportMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "push";

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Send calls by result
    pub static ref SENDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sends_total", METRIC_PREFIX),
        "Total send calls by result",
        &["result"]
    ).unwrap();

    /// Channel attempts during fan-out
    pub static ref CHANNEL_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_attempts_total", METRIC_PREFIX),
        "Total channel delivery attempts",
        &["channel"]
    ).unwrap();

    /// Time spent in a send call
    pub static ref SEND_LATENCY: Histogram = register_histogram!(
        format!("{}_send_latency_seconds", METRIC_PREFIX),
        "Send call latency in seconds",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    // ============================================================================
    // Store Metrics
    // ============================================================================

    /// In-app record writes by mode and outcome
    pub static ref STORE_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_store_writes_total", METRIC_PREFIX),
        "Total in-app record writes",
        &["mode", "outcome"]
    ).unwrap();

    /// Stored in-app records
    pub static ref STORED_MESSAGES: IntGauge = register_int_gauge!(
        format!("{}_stored_messages", METRIC_PREFIX),
        "Number of stored in-app records"
    ).unwrap();

    /// Stored in-app records not yet checked
    pub static ref UNCHECKED_MESSAGES: IntGauge = register_int_gauge!(
        format!("{}_unchecked_messages", METRIC_PREFIX),
        "Number of stored in-app records not yet checked"
    ).unwrap();

    // ============================================================================
    // Transport Metrics
    // ============================================================================

    /// External sender outcomes
    pub static ref TRANSPORT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_transport_total", METRIC_PREFIX),
        "External transport sends by channel and result",
        &["channel", "result"]
    ).unwrap();
}
