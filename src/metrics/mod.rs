//! Metrics module
//!
//! Prometheus counters and histograms for file body transfers.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref TRANSFERS_TOTAL: CounterVec = register_counter_vec!(
        "filebody_transfers_total",
        "Number of body transfers by mode and outcome",
        &["mode", "status"]  // mode: "zero_copy" or "buffered"
    ).expect("filebody_transfers_total registers once");

    pub static ref TRANSFER_BYTES: CounterVec = register_counter_vec!(
        "filebody_transfer_bytes_total",
        "Body bytes transferred by mode",
        &["mode"]
    ).expect("filebody_transfer_bytes_total registers once");

    pub static ref TRANSFER_DURATION: HistogramVec = register_histogram_vec!(
        "filebody_transfer_duration_seconds",
        "Time from submission to completion",
        &["mode"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).expect("filebody_transfer_duration_seconds registers once");

    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "filebody_errors_total",
        "Total errors",
        &["type"]
    ).expect("filebody_errors_total registers once");
}

/// Record a completed transfer
///
/// # Arguments
/// * `mode` - `"zero_copy"` or `"buffered"`
/// * `bytes` - Number of bytes transferred
/// * `duration_secs` - Submission-to-completion time in seconds
pub fn record_transfer_success(mode: &str, bytes: u64, duration_secs: f64) {
    TRANSFERS_TOTAL.with_label_values(&[mode, "success"]).inc();
    TRANSFER_BYTES.with_label_values(&[mode]).inc_by(bytes as f64);
    TRANSFER_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record a failed transfer
pub fn record_transfer_failure(mode: &str, duration_secs: f64) {
    TRANSFERS_TOTAL.with_label_values(&[mode, "failure"]).inc();
    TRANSFER_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
