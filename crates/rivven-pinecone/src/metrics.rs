//! Sink metrics
//!
//! Metrics are emitted through the [`metrics`] facade; install any recorder
//! (Prometheus exporter, etc.) to collect them.
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `pinecone.batches.written` | Counter | Batches applied successfully |
//! | `pinecone.batches.failed` | Counter | Batches rejected by the index |
//! | `pinecone.records.upserted` | Counter | Vectors upserted |
//! | `pinecone.records.deleted` | Counter | Vectors deleted |
//! | `pinecone.connections.opened` | Counter | Namespace connections opened |
//! | `pinecone.batch.size` | Gauge | Size of the batch being applied |
//! | `pinecone.batch.duration_ms` | Histogram | Bulk call latency |

use crate::batch::BatchKind;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Standard metric names
pub mod metric_names {
    /// Batches applied successfully
    pub const BATCHES_WRITTEN: &str = "pinecone.batches.written";
    /// Batches rejected by the index
    pub const BATCHES_FAILED: &str = "pinecone.batches.failed";
    /// Vectors upserted
    pub const RECORDS_UPSERTED: &str = "pinecone.records.upserted";
    /// Vectors deleted
    pub const RECORDS_DELETED: &str = "pinecone.records.deleted";
    /// Namespace connections opened
    pub const CONNECTIONS_OPENED: &str = "pinecone.connections.opened";
    /// Size of the batch being applied
    pub const BATCH_SIZE: &str = "pinecone.batch.size";
    /// Bulk call latency in milliseconds
    pub const BATCH_DURATION_MS: &str = "pinecone.batch.duration_ms";
}

pub(crate) fn record_batch_started(size: usize) {
    gauge!(metric_names::BATCH_SIZE).set(size as f64);
}

pub(crate) fn record_batch_success(kind: BatchKind, count: usize, elapsed: Duration) {
    histogram!(metric_names::BATCH_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
    counter!(metric_names::BATCHES_WRITTEN).increment(1);
    let records = match kind {
        BatchKind::Upsert => metric_names::RECORDS_UPSERTED,
        BatchKind::Delete => metric_names::RECORDS_DELETED,
    };
    counter!(records).increment(count as u64);
}

pub(crate) fn record_batch_failure(elapsed: Duration) {
    histogram!(metric_names::BATCH_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
    counter!(metric_names::BATCHES_FAILED).increment(1);
}
