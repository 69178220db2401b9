//! # Transport Layer
//!
//! Network plumbing around the protocol handler.
//!
//! ## Components
//! - **Server**: lifecycle for the paired TCP listener and UDP socket
//! - **TCP**: accept loop and the single request/response exchange
//! - **UDP**: receive loop and per-datagram replies
//! - **Client**: one-shot request helpers
//!
//! Framing failures never produce a reply: the connection is closed or the
//! datagram dropped, and the failure is logged locally.

pub mod client;
pub mod server;
pub mod tcp;
mod udp;

pub use server::Server;
