#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use arn_protocol::core::message::{Message, MessageType};
use arn_protocol::protocol::types::{Capability, CapabilityQuery, McpBridge};
use arn_protocol::protocol::{Handler, RequestContext};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_registrations_are_all_visible() {
    let handler = Arc::new(Handler::new());
    let registrations = 500usize;

    let mut tasks = JoinSet::new();
    for i in 0..registrations {
        let handler = handler.clone();
        tasks.spawn(async move {
            let cap = Capability {
                id: format!("svc-{i}"),
                capability_type: "DISCOVER".into(),
                mcp_enabled: i % 2 == 0,
                ..Default::default()
            };
            let msg = Message::json(MessageType::Register, &cap).unwrap();
            let response = handler
                .handle_message(&RequestContext::local(), &msg)
                .unwrap()
                .unwrap();
            assert_eq!(response.message_type, MessageType::Response);
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    assert_eq!(handler.capability_count().unwrap(), registrations);

    let all = handler
        .query_capabilities(&CapabilityQuery {
            capability_type: "DISCOVER".into(),
            mcp_enabled: false,
        })
        .unwrap();
    assert_eq!(all.len(), registrations);

    let mcp_only = handler
        .query_capabilities(&CapabilityQuery {
            capability_type: "DISCOVER".into(),
            mcp_enabled: true,
        })
        .unwrap();
    assert_eq!(mcp_only.len(), registrations / 2);
}

#[test]
fn concurrent_overwrites_leave_one_entry() {
    let handler = Arc::new(Handler::new());

    let threads: Vec<_> = (0..16)
        .map(|t| {
            let handler = handler.clone();
            std::thread::spawn(move || {
                for round in 0..100 {
                    handler
                        .register_capability(Capability {
                            id: "shared".into(),
                            version: format!("{t}.{round}"),
                            capability_type: "DISCOVER".into(),
                            ..Default::default()
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(handler.capability_count().unwrap(), 1);
    let stored = handler.capability("shared").unwrap().unwrap();
    assert!(stored.version.ends_with(".99"));
}

// A slow bridge notification must not hold up readers of either registry.
#[test]
fn slow_bridge_callback_does_not_block_readers() {
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let release = Arc::new(AtomicBool::new(false));
    let gate = release.clone();

    let handler = Arc::new(Handler::new().with_bridge_callback(move |_| {
        entered_tx.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !gate.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }));

    let writer = {
        let handler = handler.clone();
        std::thread::spawn(move || {
            handler
                .register_bridge(McpBridge {
                    id: "slow".into(),
                    data_types: vec!["x".into()],
                    ..Default::default()
                })
                .unwrap();
        })
    };

    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback started");

    // Callback is still running; reads and writes proceed regardless.
    let started = Instant::now();
    assert!(handler.bridge("slow").unwrap().is_some());
    handler
        .register_capability(Capability {
            id: "fast".into(),
            capability_type: "DISCOVER".into(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(handler.capability_count().unwrap(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!writer.is_finished());

    release.store(true, Ordering::SeqCst);
    writer.join().unwrap();
}
