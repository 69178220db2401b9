//! # Utility Modules
//!
//! Supporting utilities shared by the transports and the binary.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by [`LoggingConfig`](crate::config::LoggingConfig)
//! - **Metrics**: lock-free counters for server observability
//! - **Timeout**: async deadline wrappers mapped onto protocol errors

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
