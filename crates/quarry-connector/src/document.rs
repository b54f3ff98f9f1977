use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use futures::{stream, TryStreamExt};
use log::debug;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Cursor};
use quarry_common::config::{AppConfig, MongoDbConfig};
use quarry_common::spec::{RowBatch, ScalarValue};
use tokio::sync::OnceCell;

use crate::connector::{Connector, RowStream, ScanMetrics, ScanRequest};
use crate::decode::RecordDecoder;
use crate::error::{ConnectorError, ConnectorResult};
use crate::relation::RelationKind;

/// Reads every document of a MongoDB collection in natural order.
///
/// The client is created on the first scan, so opening the connector never
/// touches the network.
#[derive(Debug)]
pub struct DocumentStoreConnector {
    config: MongoDbConfig,
    timeout: Duration,
    client: OnceCell<Client>,
}

impl DocumentStoreConnector {
    pub fn try_new(config: &AppConfig) -> ConnectorResult<Self> {
        let mongodb = config
            .mongodb
            .clone()
            .ok_or_else(|| ConnectorError::connection("the mongodb backend is not configured"))?;
        Ok(Self {
            config: mongodb,
            timeout: config.execution.timeout(),
            client: OnceCell::new(),
        })
    }

    async fn client(&self) -> ConnectorResult<&Client> {
        self.client
            .get_or_try_init(|| async {
                let mut options = ClientOptions::parse(&self.config.connection_string).await?;
                options.connect_timeout = Some(self.timeout);
                options.server_selection_timeout = Some(self.timeout);
                options.app_name = Some("quarry".to_string());
                debug!("Creating MongoDB client for database {}", self.config.database);
                Ok::<_, ConnectorError>(Client::with_options(options)?)
            })
            .await
    }
}

#[async_trait]
impl Connector for DocumentStoreConnector {
    fn kind(&self) -> RelationKind {
        RelationKind::DocumentStore
    }

    async fn scan(&self, request: ScanRequest) -> ConnectorResult<RowStream> {
        let collection_name = &request.relation.path;
        if collection_name.is_empty() {
            return Err(ConnectorError::unresolved(request.relation.name.clone()));
        }
        let mut decoder = RecordDecoder::new(request.relation.name.clone());
        // a zero limit means no limit to the server
        if request.limit == Some(0) {
            let batch = RowBatch::new(decoder.freeze(), vec![]);
            return Ok(Box::pin(stream::iter([Ok(batch)])));
        }
        let collection = self
            .client()
            .await?
            .database(&self.config.database)
            .collection::<Document>(collection_name);
        let mut find = collection.find(doc! {});
        if let Some(limit) = request.limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let find = find.batch_size(u32::try_from(request.batch_size).unwrap_or(u32::MAX));
        debug!("Reading collection {collection_name}");
        let reader = DocumentReader {
            cursor: Box::pin(find.await?),
            decoder,
            batch_size: request.batch_size.max(1),
            metrics: request.metrics.clone(),
            emitted: false,
        };
        Ok(Box::pin(stream::try_unfold(reader, DocumentReader::next_batch)))
    }
}

/// Pulls documents from a server-side cursor one batch at a time.
struct DocumentReader {
    cursor: Pin<Box<Cursor<Document>>>,
    decoder: RecordDecoder,
    batch_size: usize,
    metrics: Arc<ScanMetrics>,
    emitted: bool,
}

impl DocumentReader {
    async fn next_batch(mut self) -> ConnectorResult<Option<(RowBatch, Self)>> {
        let mut records = Vec::with_capacity(self.batch_size);
        while records.len() < self.batch_size {
            let Some(document) = self.cursor.try_next().await? else {
                break;
            };
            let record = document
                .into_iter()
                .map(|(k, v)| (k, scalar_from_bson(v)))
                .collect();
            records.push(self.decoder.decode(record)?);
        }
        if records.is_empty() && self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        self.metrics.add_rows(records.len());
        let rows = self.decoder.finish(records)?;
        let batch = RowBatch::new(self.decoder.freeze(), rows);
        Ok(Some((batch, self)))
    }
}

fn scalar_from_bson(value: Bson) -> ScalarValue {
    match value {
        Bson::Null | Bson::Undefined => ScalarValue::Null,
        Bson::Boolean(v) => ScalarValue::Boolean(v),
        Bson::Int32(v) => ScalarValue::Integer(v.into()),
        Bson::Int64(v) => ScalarValue::Integer(v),
        Bson::Double(v) => ScalarValue::Float(v),
        Bson::String(v) | Bson::Symbol(v) => ScalarValue::String(v),
        Bson::ObjectId(v) => ScalarValue::String(v.to_hex()),
        Bson::DateTime(v) => DateTime::from_timestamp_millis(v.timestamp_millis())
            .map(ScalarValue::Timestamp)
            .unwrap_or(ScalarValue::Null),
        other => ScalarValue::Json(other.into_relaxed_extjson()),
    }
}
