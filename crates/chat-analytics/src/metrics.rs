
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static AGGREGATE_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static CURSOR_BATCHES: OnceLock<IntCounter> = OnceLock::new();
static RECORDS_FOLDED: OnceLock<IntCounter> = OnceLock::new();
static PAYLOAD_DECODES: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    let aggregate_requests = AGGREGATE_REQUESTS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("aggregate_requests_total", "Aggregates served per answering tier"),
            &["source"]
        ).unwrap()
    });

    let cursor_batches = CURSOR_BATCHES.get_or_init(|| {
        IntCounter::new("cursor_batches_total", "Batches fetched from message store cursors").unwrap()
    });

    let records_folded = RECORDS_FOLDED.get_or_init(|| {
        IntCounter::new("records_folded_total", "Message records folded into aggregates").unwrap()
    });

    let payload_decodes = PAYLOAD_DECODES.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("payload_decodes_total", "Payload decodes per detected encoding"),
            &["path"]
        ).unwrap()
    });
    REGISTRY.register(Box::new(aggregate_requests.clone())).ok();
    REGISTRY.register(Box::new(cursor_batches.clone())).ok();
    REGISTRY.register(Box::new(records_folded.clone())).ok();
    REGISTRY.register(Box::new(payload_decodes.clone())).ok();
}
pub fn inc_aggregate(source: &str) {
    if let Some(counter) = AGGREGATE_REQUESTS.get() {
        counter.with_label_values(&[source]).inc();
    }
}
pub fn inc_cursor_batches() {
    if let Some(counter) = CURSOR_BATCHES.get() {
        counter.inc();
    }
}
pub fn add_records_folded(count: u64) {
    if let Some(counter) = RECORDS_FOLDED.get() {
        counter.inc_by(count);
    }
}
pub fn inc_payload_decode(path: &str) {
    if let Some(counter) = PAYLOAD_DECODES.get() {
        counter.with_label_values(&[path]).inc();
    }
}

/// Text exposition of every registered metric.
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_exported_after_init() {
        init_metrics();
        inc_aggregate("cursor");
        inc_payload_decode("hex");
        add_records_folded(3);
        let text = gather_text().unwrap();
        assert!(text.contains("aggregate_requests_total"));
        assert!(text.contains("payload_decodes_total"));
        assert!(text.contains("records_folded_total"));
    }
}
