//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, and timeouts.
//!
//! ## Components
//! - **Logging**: Structured logging setup via `tracing`
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Async timeout wrappers and shared limits

pub mod logging;
pub mod metrics;
pub mod timeout;
