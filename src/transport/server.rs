//! # Dual-transport server
//!
//! One TCP listener and one UDP socket, started together and stopped
//! together.
//!
//! ## Lifecycle
//! - [`Server::start`] binds both sockets and spawns the accept and receive
//!   loops on a shared [`TaskTracker`].
//! - Every accepted connection and every decoded datagram is handled on its
//!   own task. A semaphore caps how many run at once; the loops wait for a
//!   permit before taking more work.
//! - [`Server::stop`] cancels the loops (dropping, and so closing, both
//!   sockets once their last user finishes) and then waits for every
//!   in-flight exchange. In-flight exchanges are not cancelled and the wait has
//!   no deadline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument};

use crate::config::NetworkConfig;
use crate::error::{ProtocolError, Result};
use crate::core::message::Message;
use crate::protocol::{Handler, RequestContext};
use crate::transport::{tcp, udp};
use crate::utils::metrics::{Metrics, MetricsSnapshot};

/// State shared by the loops and every handling task
#[derive(Clone)]
pub(crate) struct ServerContext {
    pub(crate) handler: Arc<Handler>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
    limiter: Arc<Semaphore>,
    pub(crate) read_timeout: Duration,
    pub(crate) max_payload_size: usize,
}

impl ServerContext {
    /// Wait for a free task slot, or fail with [`ProtocolError::Shutdown`]
    /// once the server is stopping.
    pub(crate) async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ProtocolError::Shutdown),
            permit = self.limiter.clone().acquire_owned() => {
                permit.map_err(|_| ProtocolError::Shutdown)
            }
        }
    }
}

/// Run the handler for one message on the blocking pool.
///
/// Handler callbacks are synchronous and may block, so they never run on an
/// async worker thread.
pub(crate) async fn dispatch(
    ctx: &ServerContext,
    request_ctx: RequestContext,
    message: Message,
) -> Result<Option<Message>> {
    let handler = ctx.handler.clone();
    tokio::task::spawn_blocking(move || handler.handle_message(&request_ctx, &message))
        .await
        .map_err(|e| ProtocolError::MessageHandler(format!("dispatch task failed: {e}")))?
}

/// ARN network server
pub struct Server {
    config: NetworkConfig,
    context: ServerContext,
    tcp_addr: Option<SocketAddr>,
    udp_addr: Option<SocketAddr>,
}

impl Server {
    /// Server on the given addresses with every other setting at its default
    pub fn new(
        tcp_address: impl Into<String>,
        udp_address: impl Into<String>,
        handler: Arc<Handler>,
    ) -> Self {
        let tcp_address = tcp_address.into();
        let udp_address = udp_address.into();
        let config = NetworkConfig::default_with_overrides(|config| {
            config.server.tcp_address = tcp_address;
            config.server.udp_address = udp_address;
        });
        Self::with_config(config, handler)
    }

    pub fn with_config(config: NetworkConfig, handler: Arc<Handler>) -> Self {
        let context = ServerContext {
            handler,
            metrics: Arc::new(Metrics::new()),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            limiter: Arc::new(Semaphore::new(config.server.max_concurrent_tasks)),
            read_timeout: config.server.read_timeout,
            max_payload_size: config.transport.max_payload_size,
        };

        Self {
            config,
            context,
            tcp_addr: None,
            udp_addr: None,
        }
    }

    /// Bind both sockets and start serving.
    ///
    /// If the UDP bind fails the already bound TCP listener is released.
    #[instrument(skip(self), fields(tcp = %self.config.server.tcp_address, udp = %self.config.server.udp_address))]
    pub async fn start(&mut self) -> Result<()> {
        if self.tcp_addr.is_some() {
            return Err(ProtocolError::Custom("server already started".to_string()));
        }
        if self.context.shutdown.is_cancelled() {
            return Err(ProtocolError::Shutdown);
        }

        let listener = TcpListener::bind(&self.config.server.tcp_address).await?;
        let socket = UdpSocket::bind(&self.config.server.udp_address).await?;

        let tcp_addr = listener.local_addr()?;
        let udp_addr = socket.local_addr()?;

        self.context
            .tracker
            .spawn(tcp::accept_loop(listener, self.context.clone()));
        self.context.tracker.spawn(udp::receive_loop(
            Arc::new(socket),
            self.context.clone(),
            self.config.transport.max_datagram_size,
        ));

        self.tcp_addr = Some(tcp_addr);
        self.udp_addr = Some(udp_addr);

        info!(tcp = %tcp_addr, udp = %udp_addr, "ARN server listening");
        Ok(())
    }

    /// Stop accepting work and wait for every in-flight exchange to finish.
    pub async fn stop(&self) {
        info!(
            in_flight = self.context.tracker.len(),
            "Shutting down server, waiting for in-flight exchanges"
        );

        self.context.shutdown.cancel();
        self.context.tracker.close();
        self.context.tracker.wait().await;

        self.context.metrics.log_metrics();
        info!("Server stopped");
    }

    /// Bound TCP address, once started
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Bound UDP address, once started
    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.context.handler
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.context.metrics.snapshot()
    }

    /// True between a successful start and the beginning of stop
    pub fn is_running(&self) -> bool {
        self.tcp_addr.is_some() && !self.context.shutdown.is_cancelled()
    }
}
