//! # Core Protocol Components
//!
//! Binary envelope handling and stream framing.
//!
//! ## Components
//! - **Message**: the envelope every request, response and error travels in
//! - **Codec**: Tokio codec for framing envelopes over byte streams
//!
//! ## Wire Format
//! ```text
//! [Version(1)] [Type(1)] [Length(4)] [Payload(N)] [Timestamp(8)]
//! ```
//!
//! ## Limits
//! - Payload length must fit in 32 bits
//! - Stream decoding rejects declared payloads above the configured maximum
//!   before allocating for them

pub mod codec;
pub mod message;
