use std::future::Future;

use tokio::runtime::{Handle, Runtime};

use crate::config::ExecutionConfig;
use crate::error::{CommonError, CommonResult};

/// Owns the Tokio runtime that drives connector I/O for one connection.
#[derive(Debug)]
pub struct RuntimeManager {
    runtime: Runtime,
}

impl RuntimeManager {
    pub fn try_new(config: &ExecutionConfig, name: &str) -> CommonResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name(format!("quarry-{name}"))
            .worker_threads(config.worker_threads)
            .enable_all()
            .build()
            .map_err(|e| CommonError::internal(e.to_string()))?;
        Ok(Self { runtime })
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: self.runtime.handle().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    inner: Handle,
}

impl RuntimeHandle {
    pub fn inner(&self) -> &Handle {
        &self.inner
    }

    /// Runs a future to completion from synchronous code.
    ///
    /// Calling this from within an asynchronous context is an error rather than a panic,
    /// since the blocking entry points of a connection are meant for synchronous callers.
    pub fn block_on<F: Future>(&self, future: F) -> CommonResult<F::Output> {
        if Handle::try_current().is_ok() {
            return Err(CommonError::unsupported(
                "blocking query calls must not be made from within an asynchronous context",
            ));
        }
        Ok(self.inner.block_on(future))
    }
}
