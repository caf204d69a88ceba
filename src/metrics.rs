//! Prometheus metrics for the telemetry hub.
//!
//! Counters are bumped from the ingest, enrichment and sweeper paths and
//! exposed as text at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ============================================================
    // Ingest
    // ============================================================

    /// Readings parsed and applied to the registry.
    pub static ref READINGS_INGESTED_TOTAL: IntCounter = register_int_counter!(
        "coldchain_readings_ingested_total",
        "Readings applied to the sensor registry"
    ).unwrap();

    /// Payloads rejected by the parser (labeled by reason).
    pub static ref PARSE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coldchain_parse_failures_total",
        "Inbound payloads rejected by the parser",
        &["reason"]
    ).unwrap();

    /// Keep-alive and other control frames skipped.
    pub static ref CONTROL_MESSAGES_TOTAL: IntCounter = register_int_counter!(
        "coldchain_control_messages_total",
        "Control frames received and ignored"
    ).unwrap();

    /// Payloads dropped by the bounded ingest queue (labeled by policy).
    pub static ref INGEST_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coldchain_ingest_dropped_total",
        "Payloads dropped because the ingest queue was full",
        &["policy"]
    ).unwrap();

    // ============================================================
    // Enrichment
    // ============================================================

    /// Directory lookups by outcome (found, not_found, network_error).
    pub static ref ENRICHMENT_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coldchain_enrichment_lookups_total",
        "Device directory lookups by outcome",
        &["outcome"]
    ).unwrap();

    /// Lookup requests dropped because the request queue was full.
    pub static ref ENRICHMENT_REQUESTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        "coldchain_enrichment_requests_dropped_total",
        "Enrichment requests dropped at a full queue"
    ).unwrap();

    /// Merge results (applied, kept_previous, discarded).
    pub static ref ENRICHMENT_MERGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "coldchain_enrichment_merges_total",
        "Enrichment merges by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================
    // Liveness
    // ============================================================

    /// Sensors evicted by the sweeper.
    pub static ref SENSORS_EVICTED_TOTAL: IntCounter = register_int_counter!(
        "coldchain_sensors_evicted_total",
        "Sensors evicted after going silent"
    ).unwrap();

    /// Sensors held by the registry, silent ones awaiting the sweep included.
    /// `/status` reports the live count.
    pub static ref TRACKED_SENSORS: IntGauge = register_int_gauge!(
        "coldchain_tracked_sensors",
        "Sensors held by the registry, including silent ones not yet swept"
    ).unwrap();
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
