// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline test: channel source → delivery loop → real UDP
//! socket standing in for the GELF collector.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use gelf_relay::relay::DeliveryLoop;
use gelf_relay::shutdown::{ShutdownCoordinator, ShutdownReason};
use gelf_relay::sink::{LogSink, UdpGelfSink};
use gelf_relay::source::{AckOutcome, ChannelAck, ChannelSource, InboundMessage};

fn message(
    payload: &[u8],
    content_type: &str,
    outcome_tx: mpsc::UnboundedSender<AckOutcome>,
) -> InboundMessage {
    InboundMessage {
        payload: payload.to_vec(),
        content_type: content_type.to_string(),
        acker: Box::new(ChannelAck::new(outcome_tx)),
    }
}

#[tokio::test]
async fn relay_delivers_queue_messages_to_udp_collector() {
    let collector = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind collector");
    let port = collector.local_addr().expect("local addr").port();

    let sink = UdpGelfSink::connect("127.0.0.1", port)
        .await
        .expect("connect sink");
    let (tx, source) = ChannelSource::new(16);
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let (coordinator, shutdown_handle) = ShutdownCoordinator::new();

    let relay = tokio::spawn(
        DeliveryLoop::new(source, Arc::new(sink) as Arc<dyn LogSink>, shutdown_handle).run(),
    );

    tx.send(message(
        br#"{"host":"web1","short_message":"boot ok","level":6}"#,
        "application/json",
        outcome_tx.clone(),
    ))
    .await
    .expect("send json message");

    tx.send(message(b"hello world", "text/plain", outcome_tx.clone()))
        .await
        .expect("send text message");

    let mut buf = vec![0u8; 8192];

    let (len, _) = timeout(Duration::from_secs(5), collector.recv_from(&mut buf))
        .await
        .expect("collector timed out")
        .expect("recv");
    let record: Value = serde_json::from_slice(&buf[..len]).expect("valid GELF json");
    assert_eq!(record["host"], "web1");
    assert_eq!(record["short_message"], "boot ok");
    assert_eq!(record["version"], "1.1");
    assert_eq!(record["level"], 6);

    let (len, _) = timeout(Duration::from_secs(5), collector.recv_from(&mut buf))
        .await
        .expect("collector timed out")
        .expect("recv");
    let record: Value = serde_json::from_slice(&buf[..len]).expect("valid GELF json");
    assert_eq!(record["host"], "unknown_amqp");
    assert_eq!(record["short_message"], "hello world");

    assert_eq!(outcome_rx.recv().await, Some(AckOutcome::Delivered));
    assert_eq!(outcome_rx.recv().await, Some(AckOutcome::Delivered));

    // Closing the source winds the pipeline down.
    drop(tx);
    assert_eq!(coordinator.wait().await, ShutdownReason::SourceClosed);
    relay.await.expect("relay task");
}

#[tokio::test]
async fn relay_rejects_bad_json_and_keeps_going() {
    let collector = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind collector");
    let port = collector.local_addr().expect("local addr").port();

    let sink = UdpGelfSink::connect("127.0.0.1", port)
        .await
        .expect("connect sink");
    let (tx, source) = ChannelSource::new(16);
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let (_coordinator, shutdown_handle) = ShutdownCoordinator::new();

    tokio::spawn(
        DeliveryLoop::new(source, Arc::new(sink) as Arc<dyn LogSink>, shutdown_handle).run(),
    );

    tx.send(message(
        b"{definitely not json}",
        "application/json",
        outcome_tx.clone(),
    ))
    .await
    .expect("send bad message");

    tx.send(message(b"still alive", "text/plain", outcome_tx))
        .await
        .expect("send good message");

    assert_eq!(outcome_rx.recv().await, Some(AckOutcome::Rejected));
    assert_eq!(outcome_rx.recv().await, Some(AckOutcome::Delivered));

    let mut buf = vec![0u8; 8192];
    let (len, _) = timeout(Duration::from_secs(5), collector.recv_from(&mut buf))
        .await
        .expect("collector timed out")
        .expect("recv");
    let record: Value = serde_json::from_slice(&buf[..len]).expect("valid GELF json");
    assert_eq!(record["short_message"], "still alive");
}
