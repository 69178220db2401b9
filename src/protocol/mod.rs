//! # Protocol Layer
//!
//! Payload records and the stateful message handler.
//!
//! ## Components
//! - **Types**: capabilities, MCP bridges, queries and error codes
//! - **Handler**: capability/bridge registries and per-type dispatch
//!
//! ## Dispatch
//! | Type                 | Reply                                        |
//! |----------------------|----------------------------------------------|
//! | `Hello`              | `Hello`, empty payload                       |
//! | `Register`           | `Response` or `Error`                        |
//! | `Query`              | `Response` with a JSON list of capabilities  |
//! | `MCPBridgeAdvertise` | `Response` or `Error`                        |
//! | `MCPBridgeRequest`   | `MCPBridgeResponse` with the bridge, or `Error` |
//! | anything else        | none; forwarded to the generic callback      |

pub mod handler;
pub mod types;

pub use handler::{Handler, RequestContext, Transport};
