//! Wire envelope for every ARN message.
//!
//! ```text
//! [Version(1)] [Type(1)] [Length(4)] [Payload(N)] [Timestamp(8)]
//! ```
//!
//! All integers are big-endian. The timestamp is nanoseconds since the Unix
//! epoch. Decoding is strict: the declared length must account for every byte
//! of the input, no more and no less.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::PROTOCOL_VERSION;
use crate::error::{ProtocolError, Result};
use crate::protocol::types::{ErrorCode, ErrorPayload};

/// Version, type and payload length
pub const HEADER_SIZE: usize = 6;

/// Nanosecond timestamp trailer
pub const TIMESTAMP_SIZE: usize = 8;

/// Size of a message with an empty payload
pub const MIN_MESSAGE_SIZE: usize = HEADER_SIZE + TIMESTAMP_SIZE;

/// Message type byte.
///
/// Values the dispatcher does not recognise are kept as [`MessageType::Unknown`]
/// so they can be handed to the generic message callback unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Register,
    Query,
    Response,
    Handshake,
    Error,
    AiCapabilityAdvertise,
    AiCapabilityRequest,
    AiStreamStart,
    AiStreamData,
    AiStreamEnd,
    McpBridgeAdvertise,
    McpBridgeRequest,
    McpBridgeResponse,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(byte: u8) -> Self {
        match byte {
            1 => MessageType::Hello,
            2 => MessageType::Register,
            3 => MessageType::Query,
            4 => MessageType::Response,
            5 => MessageType::Handshake,
            6 => MessageType::Error,
            7 => MessageType::AiCapabilityAdvertise,
            8 => MessageType::AiCapabilityRequest,
            9 => MessageType::AiStreamStart,
            10 => MessageType::AiStreamData,
            11 => MessageType::AiStreamEnd,
            12 => MessageType::McpBridgeAdvertise,
            13 => MessageType::McpBridgeRequest,
            14 => MessageType::McpBridgeResponse,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Hello => 1,
            MessageType::Register => 2,
            MessageType::Query => 3,
            MessageType::Response => 4,
            MessageType::Handshake => 5,
            MessageType::Error => 6,
            MessageType::AiCapabilityAdvertise => 7,
            MessageType::AiCapabilityRequest => 8,
            MessageType::AiStreamStart => 9,
            MessageType::AiStreamData => 10,
            MessageType::AiStreamEnd => 11,
            MessageType::McpBridgeAdvertise => 12,
            MessageType::McpBridgeRequest => 13,
            MessageType::McpBridgeResponse => 14,
            MessageType::Unknown(other) => other,
        }
    }
}

/// Fixed-size prefix of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub message_type: MessageType,
    pub payload_len: u32,
}

impl Header {
    /// Parse the first [`HEADER_SIZE`] bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::MessageTooShort(data.len()));
        }

        Ok(Self {
            version: data[0],
            message_type: MessageType::from(data[1]),
            payload_len: u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
        })
    }

    /// Total envelope size announced by this header
    #[inline]
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize + TIMESTAMP_SIZE
    }
}

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: u8,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time and protocol version
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Create a message whose payload is the JSON encoding of `value`
    pub fn json<T: Serialize>(message_type: MessageType, value: &T) -> Result<Self> {
        Ok(Self::new(message_type, serde_json::to_vec(value)?))
    }

    /// Empty-payload success response
    pub fn response() -> Self {
        Self::new(MessageType::Response, Vec::new())
    }

    /// Error message carrying `code` and a human-readable text
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Result<Self> {
        Self::json(
            MessageType::Error,
            &ErrorPayload {
                code,
                message: message.into(),
            },
        )
    }

    /// Decode the payload as JSON
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Serialize to the wire envelope
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload_len = u32::try_from(self.payload.len())
            .map_err(|_| ProtocolError::OversizedPacket(self.payload.len()))?;

        // Pre-1970 instants travel as their two's complement bit pattern.
        let nanos = self
            .timestamp
            .timestamp_nanos_opt()
            .ok_or(ProtocolError::InvalidTimestamp)? as u64;

        let mut out = Vec::with_capacity(MIN_MESSAGE_SIZE + self.payload.len());
        out.push(self.version);
        out.push(self.message_type.into());
        out.extend_from_slice(&payload_len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&nanos.to_be_bytes());

        Ok(out)
    }

    /// Deserialize a complete envelope.
    ///
    /// Fails with [`ProtocolError::MessageTooShort`] below [`MIN_MESSAGE_SIZE`]
    /// and with [`ProtocolError::SizeMismatch`] unless `data` is exactly as
    /// long as the header declares.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooShort(data.len()));
        }

        let header = Header::parse(data)?;
        let expected = header.frame_len();
        if data.len() != expected {
            return Err(ProtocolError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let payload_end = HEADER_SIZE + header.payload_len as usize;
        let mut ts = [0u8; TIMESTAMP_SIZE];
        ts.copy_from_slice(&data[payload_end..]);
        let nanos = u64::from_be_bytes(ts) as i64;

        Ok(Self {
            version: header.version,
            message_type: header.message_type,
            payload: data[HEADER_SIZE..payload_end].to_vec(),
            timestamp: DateTime::from_timestamp_nanos(nanos),
        })
    }
}
