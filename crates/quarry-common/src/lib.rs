pub mod config;
pub mod error;
pub mod runtime;
pub mod spec;
