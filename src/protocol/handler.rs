use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::core::message::{Message, MessageType};
use crate::error::constants::*;
use crate::error::{ProtocolError, Result};
use crate::protocol::types::{BridgeRequest, Capability, CapabilityQuery, ErrorCode, McpBridge};

type MessageFn = dyn Fn(&Message) -> Result<()> + Send + Sync + 'static;
type BridgeFn = dyn Fn(&McpBridge) -> Result<()> + Send + Sync + 'static;

/// Transport a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    Local,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Udp => f.write_str("udp"),
            Transport::Local => f.write_str("local"),
        }
    }
}

/// Where a message came from. Only used for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub peer: Option<SocketAddr>,
    pub transport: Transport,
}

impl RequestContext {
    pub fn new(peer: SocketAddr, transport: Transport) -> Self {
        Self {
            peer: Some(peer),
            transport,
        }
    }

    /// Context for messages handed to the handler in-process
    pub fn local() -> Self {
        Self {
            peer: None,
            transport: Transport::Local,
        }
    }
}

/// Capability and bridge registries plus the message dispatcher.
///
/// A single `Handler` is shared (behind an `Arc`) by every connection and
/// datagram task for the lifetime of a server. Each registry has its own
/// lock; registration is last-write-wins by id and there is no removal.
///
/// The bridge notification callback runs synchronously inside
/// [`Handler::register_bridge`] but after the registry lock is released, so a
/// slow callback delays only its own caller.
pub struct Handler {
    capabilities: RwLock<HashMap<String, Capability>>,
    bridges: RwLock<HashMap<String, McpBridge>>,
    on_message: Option<Box<MessageFn>>,
    on_bridge: Option<Box<BridgeFn>>,
}

impl Default for Handler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("capabilities", &self.capability_count().ok())
            .field("bridges", &self.bridge_count().ok())
            .field("on_message", &self.on_message.is_some())
            .field("on_bridge", &self.on_bridge.is_some())
            .finish()
    }
}

impl Handler {
    pub fn new() -> Self {
        Self {
            capabilities: RwLock::new(HashMap::new()),
            bridges: RwLock::new(HashMap::new()),
            on_message: None,
            on_bridge: None,
        }
    }

    /// Callback for every message type the dispatcher does not handle itself.
    ///
    /// Callbacks are synchronous. The server runs each dispatch on tokio's
    /// blocking pool, so a slow callback holds up only its own exchange.
    pub fn with_message_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Message) -> Result<()> + Send + Sync + 'static,
    {
        self.on_message = Some(Box::new(callback));
        self
    }

    /// Callback invoked after each bridge is stored.
    ///
    /// Runs on the registering caller's thread once the registry lock is
    /// released; see [`Handler::with_message_callback`] for how the server
    /// schedules it.
    pub fn with_bridge_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&McpBridge) -> Result<()> + Send + Sync + 'static,
    {
        self.on_bridge = Some(Box::new(callback));
        self
    }

    /// Insert or replace a capability.
    pub fn register_capability(&self, capability: Capability) -> Result<()> {
        if capability.id.is_empty() {
            return Err(ProtocolError::InvalidCapability(
                ERR_CAPABILITY_ID_REQUIRED.to_string(),
            ));
        }

        let mut capabilities = self
            .capabilities
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(ERR_CAPABILITY_WRITE_LOCK))?;

        debug!(id = %capability.id, kind = %capability.capability_type, "Registering capability");
        capabilities.insert(capability.id.clone(), capability);
        Ok(())
    }

    /// Insert or replace a bridge, then notify the bridge callback.
    ///
    /// The bridge stays registered even when the callback fails; the
    /// callback's error is returned to the caller.
    pub fn register_bridge(&self, bridge: McpBridge) -> Result<()> {
        if bridge.id.is_empty() {
            return Err(ProtocolError::InvalidBridge(ERR_BRIDGE_ID_REQUIRED.to_string()));
        }

        {
            let mut bridges = self
                .bridges
                .write()
                .map_err(|_| ProtocolError::LockPoisoned(ERR_BRIDGE_WRITE_LOCK))?;

            debug!(id = %bridge.id, endpoint = %bridge.endpoint, "Registering MCP bridge");
            bridges.insert(bridge.id.clone(), bridge.clone());
        }

        if let Some(notify) = &self.on_bridge {
            notify(&bridge).map_err(|e| ProtocolError::BridgeNotification(Box::new(e)))?;
        }

        Ok(())
    }

    /// All capabilities matching `query`, in unspecified order
    pub fn query_capabilities(&self, query: &CapabilityQuery) -> Result<Vec<Capability>> {
        let capabilities = self
            .capabilities
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(ERR_CAPABILITY_READ_LOCK))?;

        Ok(capabilities
            .values()
            .filter(|cap| query.matches(cap))
            .cloned()
            .collect())
    }

    pub fn capability(&self, id: &str) -> Result<Option<Capability>> {
        let capabilities = self
            .capabilities
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(ERR_CAPABILITY_READ_LOCK))?;
        Ok(capabilities.get(id).cloned())
    }

    pub fn bridge(&self, id: &str) -> Result<Option<McpBridge>> {
        let bridges = self
            .bridges
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(ERR_BRIDGE_READ_LOCK))?;
        Ok(bridges.get(id).cloned())
    }

    pub fn capability_count(&self) -> Result<usize> {
        self.capabilities
            .read()
            .map(|c| c.len())
            .map_err(|_| ProtocolError::LockPoisoned(ERR_CAPABILITY_READ_LOCK))
    }

    pub fn bridge_count(&self) -> Result<usize> {
        self.bridges
            .read()
            .map(|b| b.len())
            .map_err(|_| ProtocolError::LockPoisoned(ERR_BRIDGE_READ_LOCK))
    }

    /// Process one message.
    ///
    /// Returns `Ok(None)` when nothing should be sent back. Problems the peer
    /// caused come back as `Error` messages; `Err` is reserved for local
    /// failures (a failing generic callback, a poisoned lock) and means the
    /// exchange is abandoned without a reply.
    #[instrument(
        level = "debug",
        skip(self, ctx, msg),
        fields(transport = %ctx.transport, peer = ?ctx.peer, kind = ?msg.message_type)
    )]
    pub fn handle_message(&self, ctx: &RequestContext, msg: &Message) -> Result<Option<Message>> {
        match msg.message_type {
            MessageType::Hello => Ok(Some(Message::new(MessageType::Hello, Vec::new()))),
            MessageType::Register => self.handle_register(msg).map(Some),
            MessageType::Query => self.handle_query(msg).map(Some),
            MessageType::McpBridgeAdvertise => self.handle_bridge_advertise(msg).map(Some),
            MessageType::McpBridgeRequest => self.handle_bridge_request(msg).map(Some),
            _ => {
                if let Some(callback) = &self.on_message {
                    callback(msg).map_err(|e| ProtocolError::MessageHandler(e.to_string()))?;
                }
                Ok(None)
            }
        }
    }

    fn handle_register(&self, msg: &Message) -> Result<Message> {
        let capability: Capability = match decode_record(msg) {
            Ok(cap) => cap,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed capability");
                return Message::error(ErrorCode::InvalidPayload, ERR_INVALID_CAPABILITY);
            }
        };

        match self.register_capability(capability) {
            Ok(()) => Ok(Message::response()),
            Err(ProtocolError::InvalidCapability(reason)) => {
                Message::error(ErrorCode::InvalidCapabilityFormat, reason)
            }
            Err(e) => Err(e),
        }
    }

    fn handle_query(&self, msg: &Message) -> Result<Message> {
        let query: CapabilityQuery = match decode_record(msg) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed query");
                return Message::error(ErrorCode::InvalidPayload, ERR_INVALID_QUERY);
            }
        };

        let matches = self.query_capabilities(&query)?;
        debug!(
            capability_type = %query.capability_type,
            mcp_enabled = query.mcp_enabled,
            matches = matches.len(),
            "Capability query"
        );
        Message::json(MessageType::Response, &matches)
    }

    fn handle_bridge_advertise(&self, msg: &Message) -> Result<Message> {
        let bridge: McpBridge = match decode_record(msg) {
            Ok(bridge) => bridge,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed MCP bridge");
                return Message::error(ErrorCode::InvalidPayload, ERR_INVALID_BRIDGE);
            }
        };

        let id = bridge.id.clone();
        match self.register_bridge(bridge) {
            Ok(()) => {
                info!(bridge = %id, "MCP bridge advertised");
                Ok(Message::response())
            }
            Err(ProtocolError::InvalidBridge(reason)) => {
                Message::error(ErrorCode::McpEndpointUnavailable, reason)
            }
            Err(e @ ProtocolError::BridgeNotification(_)) => {
                warn!(bridge = %id, error = %e, "MCP bridge stored but notification failed");
                Message::error(ErrorCode::McpEndpointUnavailable, e.to_string())
            }
            Err(e) => Err(e),
        }
    }

    fn handle_bridge_request(&self, msg: &Message) -> Result<Message> {
        let request: BridgeRequest = match decode_record(msg) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed bridge request");
                return Message::error(ErrorCode::InvalidPayload, ERR_INVALID_BRIDGE_REQUEST);
            }
        };

        let Some(bridge) = self.bridge(&request.bridge_id)? else {
            return Message::error(ErrorCode::McpEndpointUnavailable, ERR_BRIDGE_NOT_FOUND);
        };

        if !bridge.serves(&request.data_type) {
            return Message::error(ErrorCode::McpProtocolMismatch, ERR_UNSUPPORTED_DATA_TYPE);
        }

        Message::json(MessageType::McpBridgeResponse, &bridge)
    }
}

/// Decode a JSON record payload, reading a literal `null` as the empty record.
fn decode_record<T: DeserializeOwned + Default>(msg: &Message) -> Result<T> {
    let record: Option<T> = msg.decode_payload()?;
    Ok(record.unwrap_or_default())
}
