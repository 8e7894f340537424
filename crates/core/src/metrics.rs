//! Metrics definitions for the processor.
//!
//! Metrics are collected using the `metrics` crate and exported to
//! Prometheus via `metrics-exporter-prometheus` by the binary.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_processed_total",
        "Total number of blocks whose mappings committed"
    );
    describe_histogram!(
        "block_processing_duration_seconds",
        "Time taken to process a block in seconds"
    );
    describe_counter!(
        "handler_errors_total",
        "Total number of mapping handler failures"
    );
    describe_counter!(
        "endpoint_retries_total",
        "Total number of retried block fetches"
    );
    describe_counter!(
        "entities_written_total",
        "Total number of entity rows written by mappings"
    );
    describe_counter!(
        "decode_errors_total",
        "Total number of endpoint items that could not be decoded"
    );
    describe_gauge!("last_processed_block", "Height of the last committed block");
}

/// Record a committed block.
pub fn record_block_processed(height: u64) {
    counter!("blocks_processed_total").increment(1);
    gauge!("last_processed_block").set(height as f64);
}

/// Record block processing duration.
pub fn record_block_processing_duration(duration_secs: f64) {
    histogram!("block_processing_duration_seconds").record(duration_secs);
}

/// Record a handler failure.
///
/// # Arguments
/// * `kind` - "event", "extrinsic" or "hook"
/// * `module` - The module (pallet) name
pub fn record_handler_error(kind: &str, module: &str) {
    counter!("handler_errors_total", "kind" => kind.to_string(), "module" => module.to_string())
        .increment(1);
}

/// Record a retried block fetch.
pub fn record_endpoint_retry() {
    counter!("endpoint_retries_total").increment(1);
}

/// Record an endpoint item that could not be decoded.
///
/// # Arguments
/// * `kind` - "event", "extrinsic" or "block"
/// * `module` - The module (pallet) name, "unknown" if not decoded either
pub fn record_decode_error(kind: &str, module: &str) {
    counter!("decode_errors_total", "kind" => kind.to_string(), "module" => module.to_string())
        .increment(1);
}

/// Record entity rows written.
pub fn record_entities_written(entity: &str, count: u64) {
    counter!("entities_written_total", "entity" => entity.to_string()).increment(count);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        record_block_processing_duration(self.start.elapsed().as_secs_f64());
    }
}
