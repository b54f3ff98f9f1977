use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use quarry_common::config::{AppConfig, SourceKind};

use crate::connector::Connector;
use crate::document::DocumentStoreConnector;
use crate::error::ConnectorResult;
use crate::internal::InternalConnector;
use crate::key_value::KeyValueConnector;
use crate::layers::timeout::TimeoutConnector;
use crate::relation::{RelationKind, RelationReference};
use crate::storage::ObjectStoreConnector;

/// Builds the connector for a backend.
///
/// This fails with a connection error if the backend has no configuration.
/// No network access happens here; clients connect on first use.
pub fn open_connector(kind: SourceKind, config: &AppConfig) -> ConnectorResult<Arc<dyn Connector>> {
    debug!("Opening {kind} connector");
    let connector: Arc<dyn Connector> = match kind {
        SourceKind::Disk | SourceKind::S3 | SourceKind::Gcs | SourceKind::Azure => {
            Arc::new(ObjectStoreConnector::try_new(kind, config)?)
        }
        SourceKind::MongoDb => Arc::new(DocumentStoreConnector::try_new(config)?),
        SourceKind::Redis => Arc::new(KeyValueConnector::try_new(config)?),
    };
    Ok(Arc::new(TimeoutConnector::new(
        connector,
        config.execution.timeout(),
    )))
}

/// Holds at most one open connector per backend for the lifetime of a connection.
#[derive(Debug)]
pub struct ConnectorRegistry {
    config: Arc<AppConfig>,
    internal: Arc<dyn Connector>,
    connectors: DashMap<SourceKind, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            internal: Arc::new(InternalConnector::new()),
            connectors: DashMap::new(),
        }
    }

    /// Returns the connector that serves the relation, opening it if needed.
    pub fn get(&self, relation: &RelationReference) -> ConnectorResult<Arc<dyn Connector>> {
        match (relation.kind, relation.source) {
            (RelationKind::Internal, _) | (_, None) => Ok(self.internal.clone()),
            (_, Some(kind)) => {
                let connector = self
                    .connectors
                    .entry(kind)
                    .or_try_insert_with(|| open_connector(kind, &self.config))?
                    .clone();
                Ok(connector)
            }
        }
    }

    pub fn num_open(&self) -> usize {
        self.connectors.len()
    }

    /// Drops every open connector and the clients it holds.
    pub fn clear(&self) {
        self.connectors.clear();
    }
}
