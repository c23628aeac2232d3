// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue source abstraction.
//!
//! A [`QueueSource`] yields [`InboundMessage`]s in delivery order. Every
//! message carries a consuming acknowledgment handle, so exactly one of
//! `ack` or `reject` can ever be recorded for it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::SourceError;

pub mod amqp;

/// Acknowledgment capability for one consumed message.
///
/// Both methods take `self`, destroying the handle: a message is settled at
/// most once, and never concurrently.
#[async_trait]
pub trait MessageAck: Send {
    /// Marks the message durably delivered. Single-message acknowledgment,
    /// never cumulative.
    async fn ack(self: Box<Self>) -> Result<(), SourceError>;

    /// Discards the message without requeueing it.
    async fn reject(self: Box<Self>) -> Result<(), SourceError>;
}

/// One message consumed from the queue, owned by the delivery loop for the
/// duration of a single processing cycle.
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub content_type: String,
    pub acker: Box<dyn MessageAck>,
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("payload_len", &self.payload.len())
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// A lazy, unbounded sequence of inbound messages.
#[async_trait]
pub trait QueueSource: Send {
    /// Next message in delivery order, or `None` once the source has closed.
    async fn next(&mut self) -> Option<InboundMessage>;
}

/// Queue source backed by an in-process channel.
///
/// Used by the integration tests and by embedders that feed the relay
/// without a broker.
pub struct ChannelSource {
    rx: mpsc::Receiver<InboundMessage>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl QueueSource for ChannelSource {
    async fn next(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

/// Settlement outcome reported by a [`ChannelAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Delivered,
    Rejected,
}

/// Acknowledgment handle that reports its outcome over a channel.
pub struct ChannelAck {
    outcome_tx: mpsc::UnboundedSender<AckOutcome>,
}

impl ChannelAck {
    pub fn new(outcome_tx: mpsc::UnboundedSender<AckOutcome>) -> Self {
        Self { outcome_tx }
    }

    fn settle(self, outcome: AckOutcome) -> Result<(), SourceError> {
        self.outcome_tx
            .send(outcome)
            .map_err(|_| SourceError::ChannelClosed)
    }
}

#[async_trait]
impl MessageAck for ChannelAck {
    async fn ack(self: Box<Self>) -> Result<(), SourceError> {
        self.settle(AckOutcome::Delivered)
    }

    async fn reject(self: Box<Self>) -> Result<(), SourceError> {
        self.settle(AckOutcome::Rejected)
    }
}
