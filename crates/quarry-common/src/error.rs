use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while loading configuration, driving the runtime or building rows.
#[derive(Debug, Clone, Error)]
pub enum CommonError {
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported call: {0}")]
    Unsupported(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl CommonError {
    pub fn missing(message: impl Into<String>) -> Self {
        CommonError::MissingConfig(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CommonError::InvalidConfig(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CommonError::Unsupported(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CommonError::InternalError(message.into())
    }
}
