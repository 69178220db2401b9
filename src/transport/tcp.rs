//! Connection-oriented transport: one request/response exchange per
//! connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::core::message::{Header, Message, MessageType, HEADER_SIZE, MIN_MESSAGE_SIZE};
use crate::error::{ProtocolError, Result};
use crate::protocol::{RequestContext, Transport};
use crate::transport::server::{dispatch, ServerContext};
use crate::utils::timeout::io_with_timeout;

/// Accept connections until the server is stopped.
///
/// The listener is dropped, closing the socket, when the loop exits.
pub(crate) async fn accept_loop(listener: TcpListener, ctx: ServerContext) {
    loop {
        let permit = match ctx.acquire_permit().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        match next_connection(&listener, &ctx.shutdown).await {
            Ok((stream, peer)) => {
                ctx.metrics.connection_established();
                let task_ctx = ctx.clone();
                ctx.tracker.spawn(async move {
                    handle_connection(stream, peer, &task_ctx).await;
                    task_ctx.metrics.connection_closed();
                    drop(permit);
                });
            }
            Err(e) if e.is_shutdown() => break,
            Err(e) => {
                ctx.metrics.transport_error();
                error!(error = %e, "Failed to accept TCP connection");
            }
        }
    }

    debug!("TCP accept loop stopped");
}

async fn next_connection(
    listener: &TcpListener,
    shutdown: &CancellationToken,
) -> Result<(TcpStream, SocketAddr)> {
    tokio::select! {
        _ = shutdown.cancelled() => Err(ProtocolError::Shutdown),
        accepted = listener.accept() => Ok(accepted?),
    }
}

#[instrument(level = "debug", skip(stream, ctx), fields(peer = %peer))]
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, ctx: &ServerContext) {
    if let Err(e) = exchange(&mut stream, peer, ctx).await {
        ctx.metrics.transport_error();
        warn!(error = %e, "TCP exchange failed");
    }

    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to shut down TCP stream");
    }
}

async fn exchange(stream: &mut TcpStream, peer: SocketAddr, ctx: &ServerContext) -> Result<()> {
    let request = read_message(stream, ctx.read_timeout, ctx.max_payload_size).await?;
    ctx.metrics
        .bytes_read((MIN_MESSAGE_SIZE + request.payload.len()) as u64);
    ctx.metrics.message_handled();

    let kind = request.message_type;
    let Some(response) = dispatch(ctx, RequestContext::new(peer, Transport::Tcp), request).await?
    else {
        debug!(kind = ?kind, "No response for message");
        return Ok(());
    };

    let bytes = response.to_bytes()?;
    io_with_timeout(stream.write_all(&bytes), ctx.read_timeout).await?;
    ctx.metrics
        .response_sent(bytes.len() as u64, response.message_type == MessageType::Error);
    Ok(())
}

/// Read one envelope with two exact reads: the header, then the payload and
/// timestamp trailer it announces.
///
/// Each read is bounded by `timeout`. A declared payload above
/// `max_payload_size` is rejected before anything is allocated for it.
pub async fn read_message<R>(reader: &mut R, timeout: Duration, max_payload_size: usize) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; HEADER_SIZE];
    io_with_timeout(reader.read_exact(&mut frame), timeout).await?;

    let header = Header::parse(&frame)?;
    if header.payload_len as usize > max_payload_size {
        return Err(ProtocolError::OversizedPacket(header.payload_len as usize));
    }

    frame.resize(header.frame_len(), 0);
    io_with_timeout(reader.read_exact(&mut frame[HEADER_SIZE..]), timeout).await?;

    Message::from_bytes(&frame)
}
