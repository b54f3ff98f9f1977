use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use log::debug;
use quarry_common::config::AppConfig;
use quarry_common::spec::ScalarValue;
use redis::{AsyncCommands, AsyncConnectionConfig};
use serde_json::Value;

use crate::connector::{into_batches, Connector, RowStream, ScanRequest};
use crate::decode::RecordDecoder;
use crate::error::{ConnectorError, ConnectorResult};
use crate::relation::RelationKind;

/// Reads a relation stored under a single key of a Redis server.
///
/// The value is either JSON Lines or a JSON array of objects.
/// A missing key is an empty relation.
#[derive(Debug)]
pub struct KeyValueConnector {
    client: redis::Client,
    timeout: Duration,
}

impl KeyValueConnector {
    pub fn try_new(config: &AppConfig) -> ConnectorResult<Self> {
        let redis = config
            .redis
            .as_ref()
            .ok_or_else(|| ConnectorError::connection("the redis backend is not configured"))?;
        // opening a client only parses the address
        let client = redis::Client::open(redis.url()?.as_str())?;
        Ok(Self {
            client,
            timeout: config.execution.timeout(),
        })
    }
}

#[async_trait]
impl Connector for KeyValueConnector {
    fn kind(&self) -> RelationKind {
        RelationKind::CacheBacked
    }

    async fn scan(&self, request: ScanRequest) -> ConnectorResult<RowStream> {
        let key = &request.relation.path;
        if key.is_empty() {
            return Err(ConnectorError::unresolved(request.relation.name.clone()));
        }
        let options = AsyncConnectionConfig::new()
            .set_connection_timeout(self.timeout)
            .set_response_timeout(self.timeout);
        let mut connection = self
            .client
            .get_multiplexed_async_connection_with_config(&options)
            .await?;
        let value: Option<String> = connection.get(key).await?;
        let mut decoder = RecordDecoder::new(request.relation.name.clone());
        let mut records = match value {
            Some(value) => {
                request.metrics.add_blob(value.len());
                decode_value(&mut decoder, &value)?
            }
            None => {
                debug!("Key {key} does not exist");
                vec![]
            }
        };
        if let Some(limit) = request.limit {
            records.truncate(limit);
        }
        request.metrics.add_rows(records.len());
        let rows = decoder.finish(records)?;
        let batches = into_batches(decoder.freeze(), rows, request.batch_size);
        Ok(Box::pin(stream::iter(batches.into_iter().map(Ok))))
    }
}

fn decode_value(
    decoder: &mut RecordDecoder,
    value: &str,
) -> ConnectorResult<Vec<Vec<ScalarValue>>> {
    if value.trim_start().starts_with('[') {
        let Ok(Value::Array(records)) = serde_json::from_str::<Value>(value) else {
            return Err(ConnectorError::schema("value is not a JSON array of objects"));
        };
        return records.into_iter().map(|x| decoder.decode_json(x)).collect();
    }
    value
        .lines()
        .filter(|x| !x.trim().is_empty())
        .map(|x| decoder.decode_json_line(x))
        .collect()
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use quarry_common::config::RedisConfig;

    use super::*;

    #[test]
    fn test_decode_json_array_and_lines() {
        let mut decoder = RecordDecoder::new("test");
        let records = decode_value(&mut decoder, r#"[{"a": 1}, {"a": 2.5}]"#).unwrap();
        let rows = decoder.finish(records).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("a"), Some(&ScalarValue::Float(1.0)));

        let mut decoder = RecordDecoder::new("test");
        let records =
            decode_value(&mut decoder, "{\"a\": \"x\"}\n\n{\"a\": \"y\"}\n").unwrap();
        let rows = decoder.finish(records).unwrap();
        assert_eq!(rows[1].get("a"), Some(&ScalarValue::from("y")));

        let mut decoder = RecordDecoder::new("test");
        assert!(decode_value(&mut decoder, "[1, 2").is_err());
    }

    #[test]
    fn test_open_does_not_connect() {
        let mut config = AppConfig::default();
        config.redis = Some(RedisConfig {
            server: "127.0.0.1:9".to_string(),
        });
        assert!(KeyValueConnector::try_new(&config).is_ok());
        assert!(KeyValueConnector::try_new(&AppConfig::default()).is_err());
    }
}
