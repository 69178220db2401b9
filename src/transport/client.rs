//! Minimal request helpers for talking to an ARN server.
//!
//! Both helpers perform exactly one exchange, mirroring the server's
//! one-message-per-connection model.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs, UdpSocket};
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::config::MAX_DATAGRAM_SIZE;
use crate::core::codec::MessageCodec;
use crate::core::message::Message;
use crate::error::Result;
use crate::utils::timeout::{io_with_timeout, with_timeout_error};

/// Send one message over a fresh TCP connection and read the reply.
///
/// Returns `Ok(None)` when the server closes the connection without
/// answering, which is what it does for message types it only forwards.
#[instrument(skip(addr, message), fields(kind = ?message.message_type))]
pub async fn tcp_request<A: ToSocketAddrs>(
    addr: A,
    message: Message,
    timeout: Duration,
) -> Result<Option<Message>> {
    let stream = io_with_timeout(TcpStream::connect(addr), timeout).await?;
    let mut framed = Framed::new(stream, MessageCodec::default());

    with_timeout_error(framed.send(message), timeout).await?;

    let reply = with_timeout_error(async { framed.next().await.transpose() }, timeout).await?;
    debug!(replied = reply.is_some(), "TCP exchange complete");
    Ok(reply)
}

/// Send one message as a datagram and wait for the reply datagram.
#[instrument(skip(socket, message), fields(kind = ?message.message_type))]
pub async fn udp_request(
    socket: &UdpSocket,
    addr: SocketAddr,
    message: &Message,
    timeout: Duration,
) -> Result<Message> {
    let bytes = message.to_bytes()?;
    io_with_timeout(socket.send_to(&bytes, addr), timeout).await?;

    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    let (len, from) = io_with_timeout(socket.recv_from(&mut buffer), timeout).await?;
    debug!(from = %from, bytes = len, "UDP reply received");

    Message::from_bytes(&buffer[..len])
}
