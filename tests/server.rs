//! End-to-end tests against a live server on loopback sockets

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arn_protocol::config::NetworkConfig;
use arn_protocol::core::message::{Message, MessageType};
use arn_protocol::protocol::types::{
    BridgeRequest, Capability, CapabilityQuery, ErrorCode, ErrorPayload, McpBridge,
};
use arn_protocol::protocol::Handler;
use arn_protocol::transport::client::{tcp_request, udp_request};
use arn_protocol::transport::Server;
use arn_protocol::utils::timeout::DEFAULT_TIMEOUT;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};

const WAIT: Duration = DEFAULT_TIMEOUT;

fn loopback_config(read_timeout: Duration) -> NetworkConfig {
    NetworkConfig::default_with_overrides(|config| {
        config.server.tcp_address = "127.0.0.1:0".to_string();
        config.server.udp_address = "127.0.0.1:0".to_string();
        config.server.read_timeout = read_timeout;
    })
}

async fn start(handler: Handler, read_timeout: Duration) -> (Server, SocketAddr, SocketAddr) {
    let mut server = Server::with_config(loopback_config(read_timeout), Arc::new(handler));
    server.start().await.expect("server starts");
    let tcp = server.tcp_local_addr().expect("tcp bound");
    let udp = server.udp_local_addr().expect("udp bound");
    (server, tcp, udp)
}

fn capability(id: &str, mcp_enabled: bool) -> Capability {
    Capability {
        id: id.to_string(),
        name: format!("{id} service"),
        capability_type: "DISCOVER".to_string(),
        version: "1.0".to_string(),
        mcp_enabled,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_hello_gets_empty_hello() {
    let (server, tcp, _) = start(Handler::new(), Duration::from_secs(5)).await;

    let reply = tcp_request(tcp, Message::new(MessageType::Hello, Vec::new()), WAIT)
        .await
        .unwrap()
        .expect("hello is answered");
    assert_eq!(reply.message_type, MessageType::Hello);
    assert!(reply.payload.is_empty());
    assert_eq!(reply.version, 1);

    server.stop().await;
    let metrics = server.metrics();
    assert_eq!(metrics.connections_total, 1);
    assert_eq!(metrics.connections_active, 0);
    assert_eq!(metrics.responses_sent, 1);
    assert_eq!(metrics.bytes_received, 14);
    assert_eq!(metrics.bytes_sent, 14);
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_bytes_received_include_payload() {
    let (server, tcp, _) = start(Handler::new(), Duration::from_secs(5)).await;

    tcp_request(tcp, Message::new(MessageType::Hello, vec![7u8; 100]), WAIT)
        .await
        .unwrap()
        .unwrap();

    server.stop().await;
    assert_eq!(server.metrics().bytes_received, 114);
}

// A blocking callback must not starve the runtime, even with a single worker.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn blocking_callback_does_not_stall_other_exchanges() {
    let entered = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let (entered_flag, gate) = (entered.clone(), release.clone());
    let handler = Handler::new().with_message_callback(move |_| {
        entered_flag.store(true, Ordering::SeqCst);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !gate.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    });
    let (server, tcp, _) = start(handler, Duration::from_secs(10)).await;

    let slow = tokio::spawn(async move {
        tcp_request(tcp, Message::new(MessageType::AiStreamStart, Vec::new()), Duration::from_secs(10)).await
    });
    while !entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let reply = tcp_request(tcp, Message::new(MessageType::Hello, Vec::new()), Duration::from_secs(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.message_type, MessageType::Hello);
    assert!(!slow.is_finished());

    release.store(true, Ordering::SeqCst);
    assert!(slow.await.unwrap().unwrap().is_none());
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_register_then_query() {
    let (server, tcp, _) = start(Handler::new(), Duration::from_secs(5)).await;

    for (id, mcp) in [("a", true), ("b", false)] {
        let msg = Message::json(MessageType::Register, &capability(id, mcp)).unwrap();
        let reply = tcp_request(tcp, msg, WAIT).await.unwrap().unwrap();
        assert_eq!(reply.message_type, MessageType::Response);
        assert!(reply.payload.is_empty());
    }

    let query = CapabilityQuery {
        capability_type: "DISCOVER".to_string(),
        mcp_enabled: true,
    };
    let reply = tcp_request(tcp, Message::json(MessageType::Query, &query).unwrap(), WAIT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.message_type, MessageType::Response);
    let found: Vec<Capability> = reply.decode_payload().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "a");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_invalid_capability_gets_error_message() {
    let (server, tcp, _) = start(Handler::new(), Duration::from_secs(5)).await;

    let msg = Message::new(MessageType::Register, b"not json".to_vec());
    let reply = tcp_request(tcp, msg, WAIT).await.unwrap().unwrap();
    assert_eq!(reply.message_type, MessageType::Error);
    let error: ErrorPayload = reply.decode_payload().unwrap();
    assert_eq!(error.code, ErrorCode::InvalidPayload);

    server.stop().await;
    assert_eq!(server.metrics().error_responses, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_bridge_advertise_notifies_and_serves_requests() {
    let notified = Arc::new(Mutex::new(Vec::new()));
    let seen = notified.clone();
    let handler = Handler::new().with_bridge_callback(move |bridge| {
        seen.lock().unwrap().push(bridge.id.clone());
        Ok(())
    });
    let (server, tcp, _) = start(handler, Duration::from_secs(5)).await;

    let bridge = McpBridge {
        id: "weather".to_string(),
        endpoint: "http://127.0.0.1:9000".to_string(),
        protocol: "mcp/1".to_string(),
        data_types: vec!["forecast".to_string()],
        ..Default::default()
    };
    let reply = tcp_request(
        tcp,
        Message::json(MessageType::McpBridgeAdvertise, &bridge).unwrap(),
        WAIT,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(*notified.lock().unwrap(), vec!["weather".to_string()]);

    let request = BridgeRequest {
        bridge_id: "weather".to_string(),
        data_type: "forecast".to_string(),
    };
    let reply = tcp_request(
        tcp,
        Message::json(MessageType::McpBridgeRequest, &request).unwrap(),
        WAIT,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.message_type, MessageType::McpBridgeResponse);
    let served: McpBridge = reply.decode_payload().unwrap();
    assert_eq!(served.endpoint, bridge.endpoint);

    let request = BridgeRequest {
        bridge_id: "weather".to_string(),
        data_type: "radar".to_string(),
    };
    let reply = tcp_request(
        tcp,
        Message::json(MessageType::McpBridgeRequest, &request).unwrap(),
        WAIT,
    )
    .await
    .unwrap()
    .unwrap();
    let error: ErrorPayload = reply.decode_payload().unwrap();
    assert_eq!(error.code, ErrorCode::McpProtocolMismatch);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn tcp_unhandled_type_is_forwarded_without_reply() {
    let forwarded = Arc::new(Mutex::new(Vec::new()));
    let seen = forwarded.clone();
    let handler = Handler::new().with_message_callback(move |msg| {
        seen.lock().unwrap().push(msg.message_type);
        Ok(())
    });
    let (server, tcp, _) = start(handler, Duration::from_secs(5)).await;

    let reply = tcp_request(
        tcp,
        Message::new(MessageType::Handshake, b"{}".to_vec()),
        WAIT,
    )
    .await
    .unwrap();
    assert!(reply.is_none());
    assert_eq!(*forwarded.lock().unwrap(), vec![MessageType::Handshake]);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transports_share_one_registry() {
    let (server, tcp, udp) = start(Handler::new(), Duration::from_secs(5)).await;

    let msg = Message::json(MessageType::Register, &capability("shared", false)).unwrap();
    tcp_request(tcp, msg, WAIT).await.unwrap().unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let query = CapabilityQuery {
        capability_type: "DISCOVER".to_string(),
        mcp_enabled: false,
    };
    let reply = udp_request(
        &client,
        udp,
        &Message::json(MessageType::Query, &query).unwrap(),
        WAIT,
    )
    .await
    .unwrap();
    assert_eq!(reply.message_type, MessageType::Response);
    let found: Vec<Capability> = reply.decode_payload().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "shared");

    server.stop().await;
    assert_eq!(server.handler().capability_count().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn udp_malformed_datagram_is_dropped() {
    let (server, _, udp) = start(Handler::new(), Duration::from_secs(5)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&[1, 1, 0, 0, 0], udp).await.unwrap();

    let mut buffer = [0u8; 64];
    let silent = tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buffer)).await;
    assert!(silent.is_err(), "malformed datagram must not be answered");

    // The server keeps serving afterwards.
    let reply = udp_request(&client, udp, &Message::new(MessageType::Hello, Vec::new()), WAIT)
        .await
        .unwrap();
    assert_eq!(reply.message_type, MessageType::Hello);

    server.stop().await;
    let metrics = server.metrics();
    assert_eq!(metrics.datagrams_received, 2);
    assert_eq!(metrics.datagrams_dropped, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_connection_is_closed_after_read_timeout() {
    let (server, tcp, _) = start(Handler::new(), Duration::from_millis(100)).await;

    let mut stream = TcpStream::connect(tcp).await.unwrap();
    let mut buffer = [0u8; 16];
    let read = tokio::time::timeout(WAIT, stream.read(&mut buffer))
        .await
        .expect("server closes the idle connection")
        .unwrap_or(0);
    assert_eq!(read, 0);

    server.stop().await;
    assert_eq!(server.metrics().transport_errors, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_waits_for_in_flight_exchanges() {
    let entered = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let (entered_flag, finished_flag) = (entered.clone(), finished.clone());
    let handler = Handler::new().with_message_callback(move |_| {
        entered_flag.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        finished_flag.store(true, Ordering::SeqCst);
        Ok(())
    });
    let (mut server, tcp, _) = start(handler, Duration::from_secs(5)).await;
    assert!(server.is_running());

    let in_flight = tokio::spawn(async move {
        tcp_request(tcp, Message::new(MessageType::AiCapabilityAdvertise, Vec::new()), WAIT).await
    });

    while !entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    server.stop().await;
    assert!(finished.load(Ordering::SeqCst));
    assert!(!server.is_running());
    assert!(in_flight.await.unwrap().unwrap().is_none());

    // Both sockets are closed and the server cannot be restarted.
    assert!(tcp_request(tcp, Message::new(MessageType::Hello, Vec::new()), WAIT)
        .await
        .is_err());
    assert!(server.start().await.is_err());
}
