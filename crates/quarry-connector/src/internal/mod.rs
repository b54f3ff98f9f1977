mod planets;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use log::debug;
use quarry_common::spec::{DataType, Field, RowBatch, ScalarValue, Schema};

use crate::connector::{into_batches, Connector, RowStream, ScanRequest};
use crate::error::{ConnectorError, ConnectorResult};
use crate::relation::RelationKind;

pub const PLANETS: &str = "$planets";
pub const NO_TABLE: &str = "$no_table";

/// Serves the built-in datasets from memory.
#[derive(Debug, Default)]
pub struct InternalConnector;

impl InternalConnector {
    pub fn new() -> Self {
        Self
    }

    pub fn exists(name: &str) -> bool {
        let name = name.to_lowercase();
        name == PLANETS || name == NO_TABLE
    }

    fn read(name: &str) -> ConnectorResult<RowBatch> {
        match name.to_lowercase().as_str() {
            PLANETS => planets::planets(),
            NO_TABLE => {
                let schema = Arc::new(Schema::new(vec![Field::new("$column", DataType::Null)]));
                RowBatch::try_from_values(schema, vec![vec![ScalarValue::Null]])
                    .map_err(ConnectorError::from)
            }
            _ => Err(ConnectorError::unresolved(name)),
        }
    }
}

#[async_trait]
impl Connector for InternalConnector {
    fn kind(&self) -> RelationKind {
        RelationKind::Internal
    }

    async fn scan(&self, request: ScanRequest) -> ConnectorResult<RowStream> {
        let batch = Self::read(&request.relation.name)?;
        debug!(
            "Reading {} row(s) from internal dataset {}",
            batch.num_rows(),
            request.relation.name
        );
        let schema = batch.schema().clone();
        let mut rows = batch.into_rows();
        if let Some(limit) = request.limit {
            rows.truncate(limit);
        }
        request.metrics.add_rows(rows.len());
        let batches = into_batches(schema, rows, request.batch_size);
        Ok(Box::pin(stream::iter(batches.into_iter().map(Ok))))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::relation::RelationReference;

    async fn collect(name: &str, limit: Option<usize>) -> ConnectorResult<Vec<RowBatch>> {
        let request = ScanRequest::new(RelationReference::internal(name), 4).with_limit(limit);
        InternalConnector::new().scan(request).await?.try_collect().await
    }

    #[tokio::test]
    async fn test_scan_planets() {
        let batches = collect("$PLANETS", None).await.unwrap();
        assert_eq!(
            batches.iter().map(|b| b.num_rows()).collect::<Vec<_>>(),
            vec![4, 4, 1]
        );
        let limited = collect("$planets", Some(3)).await.unwrap();
        assert_eq!(limited.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn test_scan_no_table() {
        let batches = collect("$no_table", None).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 1);
        assert_eq!(batches[0].schema().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_dataset() {
        assert!(matches!(
            collect("$moons", None).await,
            Err(ConnectorError::UnresolvedRelation(_))
        ));
    }
}
