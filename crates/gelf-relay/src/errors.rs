// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the relay pipeline.
//!
//! `ParseError` is recovered locally (the message is rejected and the loop
//! continues); `SinkError` and `SourceError` escalate to process shutdown.

/// A message body could not be turned into a GELF record.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The payload claimed to be JSON but did not decode to an object.
    #[error("payload is not a JSON object: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A well-known field was present with a type the GELF record cannot hold.
    #[error("field `{field}` has unexpected type, expected {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Writing a record to the GELF collector failed.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("gelf write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode gelf payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The encoded record does not fit in the maximum number of GELF chunks.
    #[error("gelf payload of {0} bytes exceeds the chunked datagram limit")]
    PayloadTooLarge(usize),
}

/// The queue source failed, either while consuming or while settling a message.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The in-process channel backing a test or embedded source was closed.
    #[error("message channel closed")]
    ChannelClosed,
}
