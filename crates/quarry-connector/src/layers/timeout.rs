use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::connector::{Connector, RowStream, ScanRequest};
use crate::error::{ConnectorError, ConnectorResult};
use crate::relation::RelationKind;

/// Bounds the scan call and every batch pulled from the resulting stream.
/// Expiry is reported as a connection error.
#[derive(Debug)]
pub struct TimeoutConnector {
    inner: Arc<dyn Connector>,
    timeout: Duration,
}

impl TimeoutConnector {
    pub fn new(inner: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl Connector for TimeoutConnector {
    fn kind(&self) -> RelationKind {
        self.inner.kind()
    }

    async fn scan(&self, request: ScanRequest) -> ConnectorResult<RowStream> {
        let timeout = self.timeout;
        let relation = request.relation.name.clone();
        let stream = tokio::time::timeout(timeout, self.inner.scan(request))
            .await
            .map_err(|_| {
                ConnectorError::connection(format!(
                    "timed out after {timeout:?} opening {relation}"
                ))
            })??;
        let stream = tokio_stream::StreamExt::timeout(stream, timeout).map(move |item| {
            item.unwrap_or_else(|_| {
                Err(ConnectorError::connection(format!(
                    "timed out after {timeout:?} reading {relation}"
                )))
            })
        });
        Ok(Box::pin(stream))
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use futures::stream;
    use quarry_common::spec::{RowBatch, Schema};

    use super::*;
    use crate::relation::RelationReference;

    #[derive(Debug)]
    struct SlowConnector {
        open_delay: Duration,
        batch_delay: Duration,
    }

    #[async_trait]
    impl Connector for SlowConnector {
        fn kind(&self) -> RelationKind {
            RelationKind::ObjectStore
        }

        async fn scan(&self, _request: ScanRequest) -> ConnectorResult<RowStream> {
            tokio::time::sleep(self.open_delay).await;
            let delay = self.batch_delay;
            let stream = stream::once(async move {
                tokio::time::sleep(delay).await;
                Ok(RowBatch::new(Arc::new(Schema::empty()), vec![]))
            });
            Ok(Box::pin(stream))
        }
    }

    fn request() -> ScanRequest {
        ScanRequest::new(RelationReference::internal("slow"), 10)
    }

    fn connector(open_delay: u64, batch_delay: u64) -> TimeoutConnector {
        let inner = SlowConnector {
            open_delay: Duration::from_millis(open_delay),
            batch_delay: Duration::from_millis(batch_delay),
        };
        TimeoutConnector::new(Arc::new(inner), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_scan_within_timeout() {
        let mut stream = connector(0, 0).scan(request()).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_open_times_out() {
        let result = connector(500, 0).scan(request()).await;
        assert!(matches!(result, Err(ConnectorError::Connection(_))));
    }

    #[tokio::test]
    async fn test_slow_batch_times_out() {
        let mut stream = connector(0, 500).scan(request()).await.unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Err(ConnectorError::Connection(_)))
        ));
    }
}
