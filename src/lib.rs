//! # ARN Protocol
//!
//! A length-prefixed binary message protocol and the stateful dispatcher
//! behind it: peers register **capabilities** (service descriptors) and
//! **MCP bridges** (external data-source descriptors) and query them back,
//! over TCP and UDP at the same time.
//!
//! ## Layers
//! - [`core`]: the wire envelope and a stream codec
//! - [`protocol`]: payload records and the [`Handler`](protocol::Handler)
//! - [`transport`]: the dual-transport [`Server`](transport::Server) and client helpers
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics, timeouts
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use arn_protocol::protocol::Handler;
//! use arn_protocol::transport::Server;
//!
//! # async fn run() -> arn_protocol::error::Result<()> {
//! let handler = Arc::new(Handler::new());
//! let mut server = Server::new("127.0.0.1:7777", "127.0.0.1:7778", handler);
//! server.start().await?;
//! // ...
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::core::message::{Message, MessageType};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::Handler;
pub use crate::transport::Server;
