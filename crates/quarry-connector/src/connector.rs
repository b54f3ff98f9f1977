use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use quarry_common::spec::{Row, RowBatch, SchemaRef};

use crate::error::ConnectorResult;
use crate::relation::{RelationKind, RelationReference};

/// A stream of row batches that all share one schema.
pub type RowStream = BoxStream<'static, ConnectorResult<RowBatch>>;

/// Counters a connector updates while it reads a relation.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    pub rows_read: AtomicU64,
    pub blobs_read: AtomicU64,
    pub blobs_ignored: AtomicU64,
    pub bytes_read: AtomicU64,
}

impl ScanMetrics {
    pub(crate) fn add_rows(&self, count: usize) {
        self.rows_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_blob(&self, bytes: usize) {
        self.blobs_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_ignored_blob(&self) {
        self.blobs_ignored.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub relation: RelationReference,
    /// The connector may stop once this many rows have been produced.
    pub limit: Option<usize>,
    pub batch_size: usize,
    pub metrics: Arc<ScanMetrics>,
}

impl ScanRequest {
    pub fn new(relation: RelationReference, batch_size: usize) -> Self {
        Self {
            relation,
            limit: None,
            batch_size: batch_size.max(1),
            metrics: Arc::new(ScanMetrics::default()),
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ScanMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// An adapter that exposes one kind of data source through a uniform scan interface.
#[async_trait]
pub trait Connector: Send + Sync + Debug {
    fn kind(&self) -> RelationKind;

    /// Starts reading the relation.
    ///
    /// Failures to reach the backend are reported here when they can be detected
    /// before the first batch, and otherwise as items of the returned stream.
    async fn scan(&self, request: ScanRequest) -> ConnectorResult<RowStream>;
}

/// Splits rows into batches of at most `batch_size` rows.
/// A relation without rows still yields one empty batch carrying its schema.
pub(crate) fn into_batches(schema: SchemaRef, rows: Vec<Row>, batch_size: usize) -> Vec<RowBatch> {
    if rows.is_empty() {
        return vec![RowBatch::new(schema, vec![])];
    }
    let mut batches = vec![];
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let chunk = rows.by_ref().take(batch_size.max(1)).collect();
        batches.push(RowBatch::new(schema.clone(), chunk));
    }
    batches
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use quarry_common::spec::{DataType, Field, Schema};

    use super::*;

    #[test]
    fn test_into_batches() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Integer)]));
        let rows = (0..5)
            .map(|i| Row::try_new(schema.clone(), vec![i.into()]).unwrap())
            .collect();
        let batches = into_batches(schema.clone(), rows, 2);
        assert_eq!(
            batches.iter().map(|b| b.num_rows()).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        let empty = into_batches(schema.clone(), vec![], 2);
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].schema(), &schema);
    }
}
