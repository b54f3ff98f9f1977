use quarry_common::error::CommonError;
use thiserror::Error;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors raised while resolving or reading a relation.
///
/// The variants carry rendered messages so that a single failure can be
/// cloned and handed to every caller waiting on the same cache entry.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    #[error("relation not found: {0}")]
    UnresolvedRelation(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ConnectorError {
    pub fn unresolved(name: impl Into<String>) -> Self {
        ConnectorError::UnresolvedRelation(name.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        ConnectorError::Connection(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        ConnectorError::Schema(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::InternalError(message.into())
    }
}

impl From<CommonError> for ConnectorError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::MissingConfig(x) | CommonError::InvalidConfig(x) => {
                ConnectorError::InvalidArgument(x)
            }
            CommonError::Unsupported(x) | CommonError::InternalError(x) => {
                ConnectorError::InternalError(x)
            }
        }
    }
}

impl From<object_store::Error> for ConnectorError {
    fn from(error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { path, .. } => {
                ConnectorError::UnresolvedRelation(path)
            }
            other => ConnectorError::Connection(other.to_string()),
        }
    }
}

impl From<mongodb::error::Error> for ConnectorError {
    fn from(error: mongodb::error::Error) -> Self {
        ConnectorError::Connection(error.to_string())
    }
}

impl From<redis::RedisError> for ConnectorError {
    fn from(error: redis::RedisError) -> Self {
        ConnectorError::Connection(error.to_string())
    }
}
