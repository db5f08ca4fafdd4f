//! Shared library for cross-cutting concerns in the vault sidecar workspace.
//!
//! This crate provides centralized implementations for:
//! - Retry policies with exponential backoff, elapsed-time budgets,
//!   permanent-failure escape and cancellation
//! - HTTP client configuration and building
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod http;
pub mod retry;
pub mod tracing_config;

pub use http::{HttpConfig, build_http_client};
pub use retry::{Backoff, RetryConfig, RetryError, RetryPolicy};
pub use tracing_config::{TracingConfig, init_tracing};
