use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::TryStreamExt;
use log::{debug, info};
use quarry_cache::{CacheOutcome, Fingerprint, QueryCache};
use quarry_common::config::AppConfig;
use quarry_common::runtime::RuntimeManager;
use quarry_common::spec::{RowBatch, ScalarValue, Schema};
use quarry_connector::error::ConnectorError;
use quarry_connector::{ConnectorRegistry, RelationReference, ScanMetrics, ScanRequest, NO_TABLE};

use crate::cursor::Cursor;
use crate::error::{QueryError, QueryResult};
use crate::resolver::RelationResolver;
use crate::result_set::{ResultSet, RowSource};
use crate::statement::{parse_statement, SelectPlan};
use crate::statistics::{ExecutionStatistics, QueryStatistics};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opens a connection.
///
/// The configuration is checked syntactically, but no backend is contacted
/// until a statement reads from it.
pub fn connect(config: AppConfig) -> QueryResult<Connection> {
    config.validate()?;
    let inner = ConnectionInner::try_new(config)?;
    info!("Opened connection {}", inner.id);
    Ok(Connection {
        inner: Arc::new(inner),
    })
}

/// A handle to an open connection.
///
/// Clones share the same connection. Dropping a handle does not close the
/// connection; its resources are released once the last handle and the last
/// cursor are dropped.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub fn cursor(&self) -> QueryResult<Cursor> {
        let token = self.inner.register_cursor()?;
        Ok(Cursor::new(self.inner.clone(), token))
    }

    /// Closes the connection and invalidates every cursor created from it.
    /// Closing a closed connection does nothing.
    pub fn close(&self) -> QueryResult<()> {
        {
            let mut state = self.inner.state.lock()?;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            for token in state.cursors.drain(..).filter_map(|x| x.upgrade()) {
                token.invalidate();
            }
        }
        self.inner.registry.clear();
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
        info!("Closed connection {}", self.inner.id);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().map(|x| x.closed).unwrap_or(true)
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }
}

/// Marks whether a cursor may still be used.
#[derive(Debug, Default)]
pub(crate) struct CursorToken {
    invalidated: AtomicBool,
}

impl CursorToken {
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    pub fn is_valid(&self) -> bool {
        !self.invalidated.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    closed: bool,
    cursors: Vec<Weak<CursorToken>>,
}

pub(crate) struct Execution {
    pub result: ResultSet,
    pub statistics: ExecutionStatistics,
}

pub(crate) struct ConnectionInner {
    id: u64,
    config: Arc<AppConfig>,
    runtime: RuntimeManager,
    resolver: RelationResolver,
    registry: ConnectorRegistry,
    cache: Option<QueryCache>,
    state: Mutex<ConnectionState>,
}

impl Debug for ConnectionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInner")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl ConnectionInner {
    fn try_new(config: AppConfig) -> QueryResult<Self> {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let config = Arc::new(config);
        let runtime = RuntimeManager::try_new(&config.execution, &id.to_string())?;
        let cache = config
            .cache
            .enabled
            .then(|| QueryCache::from_config(&config.cache));
        Ok(Self {
            id,
            resolver: RelationResolver::new(&config.relations),
            registry: ConnectorRegistry::new(config.clone()),
            runtime,
            cache,
            config,
            state: Mutex::new(ConnectionState::default()),
        })
    }

    fn register_cursor(&self) -> QueryResult<Arc<CursorToken>> {
        let mut state = self.state.lock()?;
        if state.closed {
            return Err(QueryError::ConnectionClosed);
        }
        state.cursors.retain(|x| x.strong_count() > 0);
        let token = Arc::new(CursorToken::default());
        state.cursors.push(Arc::downgrade(&token));
        Ok(token)
    }

    /// Plans the statement and starts reading the relation it names.
    pub fn execute(&self, sql: &str, parameters: &[ScalarValue]) -> QueryResult<Execution> {
        let plan = parse_statement(sql, parameters)?;
        let name = plan
            .relation
            .as_ref()
            .map(|x| x.name.as_str())
            .unwrap_or(NO_TABLE);
        let relation = self.resolver.resolve(name)?;
        debug!("Connection {} reads {relation}", self.id);

        let mut statistics = QueryStatistics {
            relations_read: vec![relation.name.clone()],
            ..Default::default()
        };
        let metrics = Arc::new(ScanMetrics::default());
        let source = match &self.cache {
            Some(cache) if !relation.is_internal() && !plan.no_cache() => {
                let (batch, outcome) = self.read_cached(cache, &plan, &relation, metrics.clone())?;
                statistics.record_cache(outcome);
                if outcome != CacheOutcome::Hit {
                    statistics.external_calls += 1;
                }
                RowSource::materialized(&batch)
            }
            _ => {
                if !relation.is_internal() {
                    statistics.external_calls += 1;
                }
                let connector = self.registry.get(&relation)?;
                let request = self.scan_request(&plan, &relation, metrics.clone());
                let runtime = self.runtime.handle();
                let stream = runtime.block_on(connector.scan(request))??;
                RowSource::try_streaming(stream, runtime)?
            }
        };
        Ok(Execution {
            result: ResultSet::try_new(plan, source)?,
            statistics: ExecutionStatistics::new(statistics, Some(metrics)),
        })
    }

    fn scan_request(
        &self,
        plan: &SelectPlan,
        relation: &RelationReference,
        metrics: Arc<ScanMetrics>,
    ) -> ScanRequest {
        ScanRequest::new(relation.clone(), self.config.execution.batch_size)
            .with_limit(plan.limit_hint())
            .with_metrics(metrics)
    }

    fn read_cached(
        &self,
        cache: &QueryCache,
        plan: &SelectPlan,
        relation: &RelationReference,
        metrics: Arc<ScanMetrics>,
    ) -> QueryResult<(Arc<RowBatch>, CacheOutcome)> {
        let fingerprint = Fingerprint::builder()
            .with_str(&relation.kind.to_string())
            .with_str(&relation.name)
            .with_option_u64(plan.limit_hint().map(|x| x as u64))
            .build();
        let connector = self.registry.get(relation)?;
        let request = self.scan_request(plan, relation, metrics);
        let compute = async move {
            let batches: Vec<RowBatch> = connector.scan(request).await?.try_collect().await?;
            Ok::<_, ConnectorError>(concat_batches(batches))
        };
        self.runtime
            .handle()
            .block_on(cache.get_or_compute(fingerprint, compute))?
            .map_err(|e| QueryError::from(e.as_ref().clone()))
    }
}

/// Joins the batches of one scan, taking the schema from the first batch that has one.
fn concat_batches(batches: Vec<RowBatch>) -> RowBatch {
    let schema = batches
        .iter()
        .map(|x| x.schema())
        .find(|x| !x.is_empty())
        .cloned()
        .unwrap_or_else(|| Arc::new(Schema::empty()));
    RowBatch::concat(schema, batches)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_is_idempotent() {
        let connection = connect(AppConfig::default()).unwrap();
        assert!(!connection.is_closed());
        connection.close().unwrap();
        connection.close().unwrap();
        assert!(connection.is_closed());
        assert!(matches!(connection.cursor(), Err(QueryError::ConnectionClosed)));
    }

    #[test]
    fn test_dropped_cursors_are_pruned() {
        let connection = connect(AppConfig::default()).unwrap();
        for _ in 0..3 {
            drop(connection.cursor().unwrap());
        }
        let _cursor = connection.cursor().unwrap();
        assert_eq!(connection.inner.state.lock().unwrap().cursors.len(), 1);
    }

    #[test]
    fn test_invalid_configuration() {
        let mut config = AppConfig::default();
        config.execution.timeout_secs = 0;
        assert!(matches!(connect(config), Err(QueryError::InvalidArgument(_))));
    }
}
