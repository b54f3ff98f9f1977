use std::sync::PoisonError;

use quarry_common::error::CommonError;
use quarry_connector::error::ConnectorError;
use sqlparser::parser::ParserError;
use sqlparser::tokenizer::TokenizerError;
use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// A referenced relation is neither a built-in dataset nor mapped to a backend.
    #[error("relation not found: {0}")]
    UnresolvedRelation(String),
    /// A backend could not be reached, rejected the request, or timed out.
    #[error("connection error: {0}")]
    Connection(String),
    /// Backend records could not be coerced into one schema.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("connection is closed")]
    ConnectionClosed,
    /// The cursor was closed, its connection was closed, or it has no active result.
    #[error("cursor is invalid: {0}")]
    CursorInvalid(String),
    #[error("SQL error: {0}")]
    Sql(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl QueryError {
    pub fn sql(message: impl Into<String>) -> Self {
        QueryError::Sql(message.into())
    }

    pub fn unsupported(what: impl std::fmt::Display) -> Self {
        QueryError::Sql(format!("unsupported: {what}"))
    }

    pub fn cursor_invalid(message: impl Into<String>) -> Self {
        QueryError::CursorInvalid(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        QueryError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        QueryError::InternalError(message.into())
    }
}

impl From<ConnectorError> for QueryError {
    fn from(error: ConnectorError) -> Self {
        match error {
            ConnectorError::UnresolvedRelation(x) => QueryError::UnresolvedRelation(x),
            ConnectorError::Connection(x) => QueryError::Connection(x),
            ConnectorError::Schema(x) => QueryError::Schema(x),
            ConnectorError::InvalidArgument(x) => QueryError::InvalidArgument(x),
            ConnectorError::InternalError(x) => QueryError::InternalError(x),
        }
    }
}

impl From<CommonError> for QueryError {
    fn from(error: CommonError) -> Self {
        match error {
            CommonError::MissingConfig(x)
            | CommonError::InvalidConfig(x)
            | CommonError::Unsupported(x) => QueryError::InvalidArgument(x),
            CommonError::InternalError(x) => QueryError::InternalError(x),
        }
    }
}

impl From<ParserError> for QueryError {
    fn from(error: ParserError) -> Self {
        QueryError::Sql(error.to_string())
    }
}

impl From<TokenizerError> for QueryError {
    fn from(error: TokenizerError) -> Self {
        QueryError::Sql(error.to_string())
    }
}

impl<T> From<PoisonError<T>> for QueryError {
    fn from(error: PoisonError<T>) -> Self {
        QueryError::InternalError(error.to_string())
    }
}
