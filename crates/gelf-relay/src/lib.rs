// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # GELF Relay
//!
//! Library behind the `amqp2gelf` binary: consumes messages from a durable
//! AMQP queue, translates each into a GELF record, and forwards it to a
//! Graylog-compatible collector over UDP.
//!
//! The pipeline is organized into small modules:
//! - [`gelf`]: record type and the payload-to-record builder
//! - [`source`]: queue abstraction, inbound messages, and the AMQP consumer
//! - [`sink`]: GELF/UDP writer with chunking for oversized datagrams
//! - [`relay`]: the delivery loop tying source, builder, and sink together
//! - [`shutdown`]: first-wins shutdown rendezvous and OS signal watcher
//! - [`config`]: environment-driven configuration
//!
//! Delivery semantics are at-least-once: a message is acknowledged only
//! after the sink write completed, and unparseable messages are rejected
//! without requeue so one bad payload never wedges the queue.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unreachable_pub)]

pub mod config;
pub mod errors;
pub mod gelf;
pub mod relay;
pub mod shutdown;
pub mod sink;
pub mod source;

/// Program name reported to the AMQP broker in client properties.
pub const PROGRAM_NAME: &str = "amqp2gelf";

/// Program version reported to the AMQP broker in client properties.
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
