//! Payload records exchanged inside message envelopes.
//!
//! Every payload is JSON with snake_case keys. Fields default when absent so
//! that semantic checks (an empty id, for example) are reported by the
//! registry rather than as a malformed payload.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standardized error codes carried in error messages.
///
/// Each range is a category: 1xx protocol, 2xx authentication (reserved,
/// never produced), 3xx capability, 4xx MCP bridge. The exact values match
/// what deployed peers already expect on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum ErrorCode {
    InvalidVersion,
    InvalidMessageType,
    InvalidPayload,
    Unauthorized,
    Forbidden,
    InvalidCredentials,
    CapabilityNotFound,
    CapabilityUnavailable,
    InvalidCapabilityFormat,
    McpEndpointUnavailable,
    McpProtocolMismatch,
    McpAuthenticationFailed,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::InvalidVersion => 100,
            ErrorCode::InvalidMessageType => 101,
            ErrorCode::InvalidPayload => 102,
            ErrorCode::Unauthorized => 203,
            ErrorCode::Forbidden => 204,
            ErrorCode::InvalidCredentials => 205,
            ErrorCode::CapabilityNotFound => 306,
            ErrorCode::CapabilityUnavailable => 307,
            ErrorCode::InvalidCapabilityFormat => 308,
            ErrorCode::McpEndpointUnavailable => 409,
            ErrorCode::McpProtocolMismatch => 410,
            ErrorCode::McpAuthenticationFailed => 411,
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            100 => ErrorCode::InvalidVersion,
            101 => ErrorCode::InvalidMessageType,
            102 => ErrorCode::InvalidPayload,
            203 => ErrorCode::Unauthorized,
            204 => ErrorCode::Forbidden,
            205 => ErrorCode::InvalidCredentials,
            306 => ErrorCode::CapabilityNotFound,
            307 => ErrorCode::CapabilityUnavailable,
            308 => ErrorCode::InvalidCapabilityFormat,
            409 => ErrorCode::McpEndpointUnavailable,
            410 => ErrorCode::McpProtocolMismatch,
            411 => ErrorCode::McpAuthenticationFailed,
            other => return Err(format!("unknown error code: {other}")),
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Body of an `Error` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

/// How a capability expects to be interacted with.
///
/// Only the discriminants are defined; the interaction flows themselves are
/// not part of this protocol core. Values without a named pattern are kept as
/// [`InteractionType::Other`] and echoed back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum InteractionType {
    #[default]
    Unspecified,
    Discover,
    Negotiate,
    Stream,
    Delegate,
    Other(u8),
}

impl From<InteractionType> for u8 {
    fn from(kind: InteractionType) -> Self {
        match kind {
            InteractionType::Unspecified => 0,
            InteractionType::Discover => 1,
            InteractionType::Negotiate => 2,
            InteractionType::Stream => 3,
            InteractionType::Delegate => 4,
            InteractionType::Other(other) => other,
        }
    }
}

impl From<u8> for InteractionType {
    fn from(value: u8) -> Self {
        match value {
            0 => InteractionType::Unspecified,
            1 => InteractionType::Discover,
            2 => InteractionType::Negotiate,
            3 => InteractionType::Stream,
            4 => InteractionType::Delegate,
            other => InteractionType::Other(other),
        }
    }
}

/// A service descriptor, keyed by `id`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capability {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    pub version: String,
    pub interaction: InteractionType,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "is_false")]
    pub mcp_enabled: bool,
}

/// `0001-01-01T00:00:00Z`, the timestamp peers send for a bridge that was
/// never stamped
const UNSET_TIMESTAMP_SECS: i64 = -62_135_596_800;

/// An external data-source descriptor, keyed by `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpBridge {
    pub id: String,
    pub endpoint: String,
    /// MCP protocol version spoken by the endpoint
    pub protocol: String,
    pub data_types: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for McpBridge {
    fn default() -> Self {
        Self {
            id: String::new(),
            endpoint: String::new(),
            protocol: String::new(),
            data_types: Vec::new(),
            metadata: HashMap::new(),
            last_updated: DateTime::from_timestamp(UNSET_TIMESTAMP_SECS, 0).unwrap_or_default(),
        }
    }
}

impl McpBridge {
    pub fn serves(&self, data_type: &str) -> bool {
        self.data_types.iter().any(|dt| dt == data_type)
    }
}

/// Filter sent in a `Query` message.
///
/// `mcp_enabled: true` restricts matches to MCP-enabled capabilities; `false`
/// admits both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityQuery {
    pub capability_type: String,
    #[serde(skip_serializing_if = "is_false")]
    pub mcp_enabled: bool,
}

impl CapabilityQuery {
    pub fn matches(&self, capability: &Capability) -> bool {
        capability.capability_type == self.capability_type
            && (!self.mcp_enabled || capability.mcp_enabled)
    }
}

/// Body of an `MCPBridgeRequest` message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeRequest {
    pub bridge_id: String,
    pub data_type: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}
