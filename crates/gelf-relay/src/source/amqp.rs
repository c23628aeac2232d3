// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! AMQP 0.9.1 queue source.
//!
//! Declares the durable queue, consumes it in explicit-ack mode, and wires
//! broker connection loss into the shutdown rendezvous. Connection and
//! channel establishment happen once at startup; there is no reconnect.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::SourceError;
use crate::shutdown::{ShutdownHandle, ShutdownReason};
use crate::source::{InboundMessage, MessageAck, QueueSource};

/// Queue source consuming a durable AMQP queue.
pub struct AmqpQueueSource {
    consumer: Consumer,
    // Held so the broker connection outlives the consumer stream.
    _channel: Channel,
    _connection: Connection,
}

impl AmqpQueueSource {
    /// Connects to the broker, declares the queue, and starts the consumer.
    ///
    /// The broker's close notification is routed into `shutdown`; an
    /// unexpected connection loss is fatal to the pipeline.
    pub async fn connect(config: &Config, shutdown: ShutdownHandle) -> Result<Self, SourceError> {
        let mut properties = ConnectionProperties::default();
        properties.client_properties.insert(
            "product".into(),
            AMQPValue::LongString(crate::PROGRAM_NAME.into()),
        );
        properties.client_properties.insert(
            "version".into(),
            AMQPValue::LongString(crate::PROGRAM_VERSION.into()),
        );

        debug!(uri = %config.amqp_uri, "connecting to AMQP broker");
        let connection = Connection::connect(&config.amqp_uri, properties).await?;

        connection.on_error(move |err| {
            shutdown.signal(ShutdownReason::SourceConnectionLost(err.to_string()));
        });

        let channel = connection.create_channel().await?;

        let queue = channel
            .queue_declare(
                &config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        let consumer_tag = format!("{}-{}", crate::PROGRAM_NAME, std::process::id());
        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(queue = %config.queue_name, tag = %consumer_tag, "AMQP consumer started");

        Ok(Self {
            consumer,
            _channel: channel,
            _connection: connection,
        })
    }
}

#[async_trait]
impl QueueSource for AmqpQueueSource {
    async fn next(&mut self) -> Option<InboundMessage> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => {
                let content_type = delivery
                    .properties
                    .content_type()
                    .as_ref()
                    .map(|ct| ct.as_str().to_string())
                    .unwrap_or_default();
                Some(InboundMessage {
                    payload: delivery.data,
                    content_type,
                    acker: Box::new(AmqpAck {
                        acker: delivery.acker,
                    }),
                })
            }
            Some(Err(err)) => {
                error!(error = %err, "AMQP consumer stream failed");
                None
            }
            None => None,
        }
    }
}

struct AmqpAck {
    acker: Acker,
}

#[async_trait]
impl MessageAck for AmqpAck {
    async fn ack(self: Box<Self>) -> Result<(), SourceError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(SourceError::from)
    }

    async fn reject(self: Box<Self>) -> Result<(), SourceError> {
        self.acker
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map_err(SourceError::from)
    }
}
