mod builder;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{stream, TryStreamExt};
use log::{debug, warn};
use object_store::path::Path;
use object_store::ObjectStore;
use quarry_common::config::{AppConfig, SourceKind};
use quarry_common::spec::{RowBatch, ScalarValue};

use crate::connector::{Connector, RowStream, ScanMetrics, ScanRequest};
use crate::decode::RecordDecoder;
use crate::error::{ConnectorError, ConnectorResult};
use crate::relation::RelationKind;
use crate::storage::builder::StoreOptions;

const DATA_EXTENSION: &str = "jsonl";
const CONTROL_EXTENSIONS: [&str; 2] = ["complete", "ignore"];

/// Reads JSON Lines blobs from an object store (S3, GCS, Azure, or a local directory).
///
/// One store client is created per bucket on first use and reused afterwards.
#[derive(Debug)]
pub struct ObjectStoreConnector {
    source: SourceKind,
    options: StoreOptions,
    timeout: Duration,
    stores: DashMap<String, Arc<dyn ObjectStore>>,
}

impl ObjectStoreConnector {
    pub fn try_new(source: SourceKind, config: &AppConfig) -> ConnectorResult<Self> {
        let not_configured =
            || ConnectorError::connection(format!("the {source} backend is not configured"));
        let options = match source {
            SourceKind::Disk => StoreOptions::Disk(config.disk.clone().unwrap_or_default()),
            SourceKind::S3 => StoreOptions::S3(config.s3.clone().ok_or_else(not_configured)?),
            SourceKind::Gcs => StoreOptions::Gcs(config.gcs.clone().ok_or_else(not_configured)?),
            SourceKind::Azure => {
                StoreOptions::Azure(config.azure.clone().ok_or_else(not_configured)?)
            }
            SourceKind::MongoDb | SourceKind::Redis => {
                return Err(ConnectorError::internal(format!(
                    "{source} is not an object store"
                )))
            }
        };
        Ok(Self {
            source,
            options,
            timeout: config.execution.timeout(),
            stores: DashMap::new(),
        })
    }

    fn get_store(&self, bucket: &str) -> ConnectorResult<Arc<dyn ObjectStore>> {
        let store = self
            .stores
            .entry(bucket.to_string())
            .or_try_insert_with(|| self.options.build(bucket, self.timeout))?
            .clone();
        Ok(store)
    }

    /// Lists the data blobs under the prefix in path order.
    async fn list_blobs(
        &self,
        store: &Arc<dyn ObjectStore>,
        prefix: &str,
        metrics: &ScanMetrics,
    ) -> ConnectorResult<Vec<Path>> {
        let prefix = (!prefix.is_empty()).then(|| Path::from(prefix));
        let mut found = store
            .list(prefix.as_ref())
            .map_ok(|meta| meta.location)
            .try_collect::<Vec<_>>()
            .await?;
        found.sort();
        let total = found.len();
        let mut blobs = vec![];
        for location in found {
            match location.extension() {
                Some(DATA_EXTENSION) => blobs.push(location),
                Some(x) if CONTROL_EXTENSIONS.contains(&x) => {}
                _ => {
                    warn!("Ignoring blob {location} with unsupported format");
                    metrics.add_ignored_blob();
                }
            }
        }
        debug!(
            "Found {} data blob(s) among {total} blob(s) under {}",
            blobs.len(),
            prefix.map(|x| x.to_string()).unwrap_or_default()
        );
        if blobs.is_empty() {
            return Err(ConnectorError::unresolved("no data blobs found under the prefix"));
        }
        Ok(blobs)
    }
}

#[async_trait]
impl Connector for ObjectStoreConnector {
    fn kind(&self) -> RelationKind {
        self.source.into()
    }

    async fn scan(&self, request: ScanRequest) -> ConnectorResult<RowStream> {
        let relation = &request.relation;
        let bucket = relation.namespace.as_deref().ok_or_else(|| {
            ConnectorError::unresolved(format!("{relation} does not name a bucket"))
        })?;
        let store = self.get_store(bucket)?;
        let blobs = self
            .list_blobs(&store, &relation.path, &request.metrics)
            .await
            .map_err(|e| match e {
                ConnectorError::UnresolvedRelation(_) => {
                    ConnectorError::unresolved(relation.name.clone())
                }
                other => other,
            })?;
        let reader = BlobReader {
            store,
            blobs: blobs.into(),
            decoder: RecordDecoder::new(relation.name.clone()),
            pending: VecDeque::new(),
            remaining: request.limit,
            batch_size: request.batch_size,
            metrics: request.metrics.clone(),
            emitted: false,
        };
        Ok(Box::pin(stream::try_unfold(reader, BlobReader::next_batch)))
    }
}

/// Reads blobs one at a time and regroups their records into batches.
struct BlobReader {
    store: Arc<dyn ObjectStore>,
    blobs: VecDeque<Path>,
    decoder: RecordDecoder,
    pending: VecDeque<Vec<ScalarValue>>,
    remaining: Option<usize>,
    batch_size: usize,
    metrics: Arc<ScanMetrics>,
    emitted: bool,
}

impl BlobReader {
    async fn read_blob(&mut self, location: Path) -> ConnectorResult<()> {
        let bytes = self.store.get(&location).await?.bytes().await?;
        self.metrics.add_blob(bytes.len());
        let text = std::str::from_utf8(&bytes).map_err(|e| {
            ConnectorError::schema(format!("blob {location} is not valid UTF-8: {e}"))
        })?;
        let mut count = 0;
        for line in text.lines().filter(|x| !x.trim().is_empty()) {
            self.pending.push_back(self.decoder.decode_json_line(line)?);
            count += 1;
        }
        debug!("Read {count} record(s) from blob {location}");
        self.metrics.add_rows(count);
        Ok(())
    }

    fn wanted(&self) -> usize {
        self.remaining
            .map_or(self.batch_size, |x| x.min(self.batch_size))
    }

    async fn next_batch(mut self) -> ConnectorResult<Option<(RowBatch, Self)>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        while self.pending.len() < self.wanted() {
            let Some(location) = self.blobs.pop_front() else {
                break;
            };
            self.read_blob(location).await?;
        }
        if self.pending.is_empty() {
            if self.emitted {
                return Ok(None);
            }
            self.emitted = true;
            let batch = RowBatch::new(self.decoder.freeze(), vec![]);
            return Ok(Some((batch, self)));
        }
        let count = self.wanted().min(self.pending.len());
        let rows = self.decoder.finish(self.pending.drain(..count).collect())?;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= count;
        }
        self.emitted = true;
        let batch = RowBatch::new(self.decoder.freeze(), rows);
        Ok(Some((batch, self)))
    }
}
