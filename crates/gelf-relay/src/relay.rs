// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The delivery loop.
//!
//! Consumes inbound messages one at a time, in delivery order, with exactly
//! one in-flight message: the sink write and the acknowledgment are awaited
//! before the next message is pulled. A parse failure rejects the message
//! and moves on; a sink failure rejects the message and takes the whole
//! pipeline down.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::gelf;
use crate::shutdown::{ShutdownHandle, ShutdownReason};
use crate::sink::LogSink;
use crate::source::{InboundMessage, QueueSource};

/// Long-lived task translating queue messages into sink records.
pub struct DeliveryLoop<S> {
    source: S,
    sink: Arc<dyn LogSink>,
    shutdown: ShutdownHandle,
}

impl<S: QueueSource> DeliveryLoop<S> {
    pub fn new(source: S, sink: Arc<dyn LogSink>, shutdown: ShutdownHandle) -> Self {
        Self {
            source,
            sink,
            shutdown,
        }
    }

    /// Runs until the source closes or a sink failure escalates to shutdown.
    pub async fn run(mut self) {
        while let Some(message) = self.source.next().await {
            if !self.deliver(message).await {
                return;
            }
        }
        self.shutdown.signal(ShutdownReason::SourceClosed);
    }

    /// Processes one message. Returns `false` once the pipeline must stop.
    async fn deliver(&self, message: InboundMessage) -> bool {
        let InboundMessage {
            payload,
            content_type,
            acker,
        } = message;

        let record = match gelf::build(&payload, &content_type) {
            Ok(record) => record,
            Err(err) => {
                // One bad message never halts the loop and is never retried.
                debug!(error = %err, "rejecting message that failed to parse");
                if let Err(err) = acker.reject().await {
                    warn!(error = %err, "failed to reject unparseable message");
                }
                return true;
            }
        };

        debug!(?record, "forwarding gelf record");

        if let Err(err) = self.sink.send(&record).await {
            if let Err(reject_err) = acker.reject().await {
                warn!(error = %reject_err, "failed to reject message after sink error");
            }
            self.shutdown
                .signal(ShutdownReason::SinkFailure(err.to_string()));
            return false;
        }

        if let Err(err) = acker.ack().await {
            warn!(error = %err, "failed to acknowledge delivered message");
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::errors::SinkError;
    use crate::gelf::GelfMessage;
    use crate::shutdown::ShutdownCoordinator;
    use crate::source::{AckOutcome, ChannelAck, ChannelSource};
    use async_trait::async_trait;
    use std::io;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<GelfMessage>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn records(&self) -> Vec<GelfMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogSink for RecordingSink {
        async fn send(&self, message: &GelfMessage) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "collector down",
                )));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct Harness {
        tx: mpsc::Sender<InboundMessage>,
        outcome_tx: mpsc::UnboundedSender<AckOutcome>,
        outcome_rx: mpsc::UnboundedReceiver<AckOutcome>,
        sink: Arc<RecordingSink>,
        coordinator: ShutdownCoordinator,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(sink: RecordingSink) -> Harness {
        let (tx, source) = ChannelSource::new(16);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (coordinator, handle) = ShutdownCoordinator::new();
        let sink = Arc::new(sink);
        let task = tokio::spawn(
            DeliveryLoop::new(source, Arc::clone(&sink) as Arc<dyn LogSink>, handle).run(),
        );
        Harness {
            tx,
            outcome_tx,
            outcome_rx,
            sink,
            coordinator,
            task,
        }
    }

    impl Harness {
        async fn send(&self, payload: &[u8], content_type: &str) {
            self.tx
                .send(InboundMessage {
                    payload: payload.to_vec(),
                    content_type: content_type.to_string(),
                    acker: Box::new(ChannelAck::new(self.outcome_tx.clone())),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_messages_delivered_and_acked_in_order() {
        let mut harness = start(RecordingSink::default());

        harness.send(b"first", "text/plain").await;
        harness.send(br#"{"host":"web1"}"#, "application/json").await;

        assert_eq!(harness.outcome_rx.recv().await, Some(AckOutcome::Delivered));
        assert_eq!(harness.outcome_rx.recv().await, Some(AckOutcome::Delivered));

        let records = harness.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].short_message, "first");
        assert_eq!(records[1].host, "web1");
    }

    #[tokio::test]
    async fn test_parse_error_rejects_and_continues() {
        let mut harness = start(RecordingSink::default());

        harness.send(b"{bad json}", "application/json").await;
        harness.send(b"good", "text/plain").await;

        assert_eq!(harness.outcome_rx.recv().await, Some(AckOutcome::Rejected));
        assert_eq!(harness.outcome_rx.recv().await, Some(AckOutcome::Delivered));

        let records = harness.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].short_message, "good");
        assert!(!harness.task.is_finished());
    }

    #[tokio::test]
    async fn test_sink_failure_rejects_and_shuts_down() {
        let mut harness = start(RecordingSink::failing());

        harness.send(b"doomed", "text/plain").await;
        harness.send(b"never processed", "text/plain").await;

        assert_eq!(harness.outcome_rx.recv().await, Some(AckOutcome::Rejected));
        assert!(matches!(
            harness.coordinator.wait().await,
            ShutdownReason::SinkFailure(_)
        ));

        // The loop stopped before touching the second message.
        harness.task.await.unwrap();
        drop(harness.outcome_tx);
        assert_eq!(harness.outcome_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_source_close_signals_shutdown() {
        let harness = start(RecordingSink::default());

        drop(harness.tx);

        assert_eq!(harness.coordinator.wait().await, ShutdownReason::SourceClosed);
        harness.task.await.unwrap();
    }
}
