//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::notification::{Channel, SendMode};
use crate::store::UpsertOutcome;

use super::{CHANNEL_ATTEMPTS_TOTAL, SENDS_TOTAL, SEND_LATENCY, STORE_WRITES_TOTAL, TRANSPORT_TOTAL};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    pub fn record_accepted() {
        SENDS_TOTAL.with_label_values(&["accepted"]).inc();
    }

    pub fn record_invalid() {
        SENDS_TOTAL.with_label_values(&["invalid"]).inc();
    }

    pub fn record_failed() {
        SENDS_TOTAL.with_label_values(&["failed"]).inc();
    }

    pub fn record_channel_attempt(channel: Channel) {
        CHANNEL_ATTEMPTS_TOTAL
            .with_label_values(&[channel.as_str()])
            .inc();
    }

    pub fn observe_latency(seconds: f64) {
        SEND_LATENCY.observe(seconds);
    }
}

/// Helper struct for recording store metrics
pub struct StoreMetrics;

impl StoreMetrics {
    pub fn record_write(mode: SendMode, outcome: UpsertOutcome) {
        STORE_WRITES_TOTAL
            .with_label_values(&[mode.as_str(), outcome.as_str()])
            .inc();
    }
}

/// Helper struct for recording transport metrics
pub struct TransportMetrics;

impl TransportMetrics {
    pub fn record_sent(channel: Channel) {
        TRANSPORT_TOTAL
            .with_label_values(&[channel.as_str(), "sent"])
            .inc();
    }

    pub fn record_failed(channel: Channel) {
        TRANSPORT_TOTAL
            .with_label_values(&[channel.as_str(), "failed"])
            .inc();
    }

    /// No contact, subsystem not installed, or protocol built no sender
    pub fn record_skipped(channel: Channel) {
        TRANSPORT_TOTAL
            .with_label_values(&[channel.as_str(), "skipped"])
            .inc();
    }
}
