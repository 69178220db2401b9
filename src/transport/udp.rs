//! Datagram transport: each datagram is one complete envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::core::message::{Message, MessageType};
use crate::error::{ProtocolError, Result};
use crate::protocol::{RequestContext, Transport};
use crate::transport::server::{dispatch, ServerContext};

/// Receive datagrams until the server is stopped.
///
/// Datagrams that do not decode are dropped without a reply. Decoded messages
/// are handled on their own task.
pub(crate) async fn receive_loop(socket: Arc<UdpSocket>, ctx: ServerContext, max_datagram_size: usize) {
    let mut buffer = vec![0u8; max_datagram_size];

    loop {
        let (len, peer) = match next_datagram(&socket, &mut buffer, &ctx.shutdown).await {
            Ok(received) => received,
            Err(e) if e.is_shutdown() => break,
            Err(e) => {
                ctx.metrics.transport_error();
                error!(error = %e, "Failed to read UDP packet");
                continue;
            }
        };
        ctx.metrics.datagram_received(len as u64);

        let message = match Message::from_bytes(&buffer[..len]) {
            Ok(message) => message,
            Err(e) => {
                ctx.metrics.datagram_dropped();
                warn!(peer = %peer, bytes = len, error = %e, "Dropping malformed datagram");
                continue;
            }
        };

        let permit = match ctx.acquire_permit().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let socket = socket.clone();
        let task_ctx = ctx.clone();
        ctx.tracker.spawn(async move {
            handle_datagram(&socket, message, peer, &task_ctx).await;
            drop(permit);
        });
    }

    debug!("UDP receive loop stopped");
}

async fn next_datagram(
    socket: &UdpSocket,
    buffer: &mut [u8],
    shutdown: &CancellationToken,
) -> Result<(usize, SocketAddr)> {
    tokio::select! {
        _ = shutdown.cancelled() => Err(ProtocolError::Shutdown),
        received = socket.recv_from(buffer) => Ok(received?),
    }
}

#[instrument(level = "debug", skip(socket, message, ctx), fields(peer = %peer))]
async fn handle_datagram(socket: &UdpSocket, message: Message, peer: SocketAddr, ctx: &ServerContext) {
    let kind = message.message_type;
    if let Err(e) = respond(socket, message, peer, ctx).await {
        ctx.metrics.transport_error();
        warn!(error = %e, kind = ?kind, "UDP exchange failed");
    }
}

async fn respond(socket: &UdpSocket, message: Message, peer: SocketAddr, ctx: &ServerContext) -> Result<()> {
    ctx.metrics.message_handled();

    let response = dispatch(ctx, RequestContext::new(peer, Transport::Udp), message).await?;

    let Some(response) = response else {
        return Ok(());
    };

    let bytes = response.to_bytes()?;
    socket.send_to(&bytes, peer).await?;
    ctx.metrics
        .response_sent(bytes.len() as u64, response.message_type == MessageType::Error);
    Ok(())
}
