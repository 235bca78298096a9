//! Process-wide metrics, exported on the `/metrics` endpoint. Gauges
//! track point-in-time pipeline state; histograms and counters track
//! cumulative throughput and retry behavior.

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, register_counter, register_gauge, register_histogram, Counter, Gauge,
    Encoder, Histogram, TextEncoder,
};

static RECORDS_WRITTEN: Lazy<Counter> = Lazy::new(|| {
    register_counter!("records_written_total", "Enriched records persisted to the document store")
        .unwrap()
});

static RETRY_MAP_SIZE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "retry_map_size",
        "Logs postponed awaiting their transaction receipt"
    )
    .unwrap()
});

static WS_RECONNECTS: Lazy<Counter> = Lazy::new(|| {
    register_counter!("ws_reconnects_total", "WebSocket reconnects to the node provider").unwrap()
});

static ENRICHMENT_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "enrichment_latency_seconds",
        "Time spent enriching a log into a record",
        exponential_buckets(0.001, 2.0, 12).unwrap()
    )
    .unwrap()
});

pub fn record_written() {
    RECORDS_WRITTEN.inc();
}

pub fn records_written_by(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    RECORDS_WRITTEN.inc_by(count as f64);
}

pub fn set_retry_map_size(size: usize) {
    #[allow(clippy::cast_precision_loss)]
    RETRY_MAP_SIZE.set(size as f64);
}

pub fn ws_reconnected() {
    WS_RECONNECTS.inc();
}

pub fn observe_enrichment_latency(seconds: f64) {
    ENRICHMENT_LATENCY.observe(seconds);
}

/// Renders the process's metrics in the Prometheus text exposition
/// format, for the `/metrics` route.
pub fn encode() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_registered_metrics() {
        record_written();
        set_retry_map_size(3);
        let output = String::from_utf8(encode().unwrap()).unwrap();
        assert!(output.contains("records_written_total"));
        assert!(output.contains("retry_map_size"));
    }
}
