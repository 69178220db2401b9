//! Observability and Metrics
//!
//! Atomic counters describing server traffic. Each [`Server`](crate::transport::server::Server)
//! owns one collector; take a [`MetricsSnapshot`] to read a consistent-enough view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one server instance
#[derive(Debug)]
pub struct Metrics {
    /// Total TCP connections accepted
    pub connections_total: AtomicU64,
    /// TCP connections currently being handled
    pub connections_active: AtomicU64,
    /// Total datagrams received
    pub datagrams_received: AtomicU64,
    /// Datagrams dropped because they did not decode
    pub datagrams_dropped: AtomicU64,
    /// Messages passed to the handler
    pub messages_handled: AtomicU64,
    /// Responses written back to peers
    pub responses_sent: AtomicU64,
    /// Responses that were error messages
    pub error_responses: AtomicU64,
    /// Local transport or handler failures
    pub transport_errors: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            datagrams_received: AtomicU64::new(0),
            datagrams_dropped: AtomicU64::new(0),
            messages_handled: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            error_responses: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn datagram_received(&self, byte_count: u64) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn datagram_dropped(&self) {
        self.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decoded message reaching the handler
    pub fn message_handled(&self) {
        self.messages_handled.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes read over TCP
    pub fn bytes_read(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn response_sent(&self, byte_count: u64, is_error: bool) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
        if is_error {
            self.error_responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            messages_handled: self.messages_handled.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            datagrams_received = snapshot.datagrams_received,
            datagrams_dropped = snapshot.datagrams_dropped,
            messages_handled = snapshot.messages_handled,
            responses_sent = snapshot.responses_sent,
            error_responses = snapshot.error_responses,
            transport_errors = snapshot.transport_errors,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub datagrams_received: u64,
    pub datagrams_dropped: u64,
    pub messages_handled: u64,
    pub responses_sent: u64,
    pub error_responses: u64,
    pub transport_errors: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub uptime_seconds: u64,
}
