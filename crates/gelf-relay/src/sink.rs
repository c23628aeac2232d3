// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF/UDP sink.
//!
//! Serializes one record per datagram. Payloads that do not fit in a single
//! datagram are split into GELF chunks: a 12-byte header (magic, message id,
//! sequence number, sequence count) followed by up to [`MAX_CHUNK_PAYLOAD`]
//! bytes, capped at [`MAX_CHUNKS`] chunks per message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::trace;

use crate::errors::SinkError;
use crate::gelf::GelfMessage;

const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];

/// Chunk payload size safe for WAN path MTUs, per GELF chunked mode.
pub const MAX_CHUNK_PAYLOAD: usize = 1420;

/// A chunked GELF message carries its sequence count in one byte, of which
/// the collector accepts at most 128.
pub const MAX_CHUNKS: usize = 128;

/// Destination for structured log records, one record per call.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Forwards one record. Failures are reported synchronously and are
    /// fatal to the pipeline.
    async fn send(&self, message: &GelfMessage) -> Result<(), SinkError>;
}

/// GELF sink writing datagrams to a collector at `host:port`.
pub struct UdpGelfSink {
    socket: UdpSocket,
}

impl UdpGelfSink {
    /// Binds an ephemeral local socket and connects it to the collector.
    pub async fn connect(host: &str, port: u16) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        Ok(Self { socket })
    }

    async fn send_chunked(&self, payload: &[u8]) -> Result<(), SinkError> {
        let chunks: Vec<&[u8]> = payload.chunks(MAX_CHUNK_PAYLOAD).collect();
        if chunks.len() > MAX_CHUNKS {
            return Err(SinkError::PayloadTooLarge(payload.len()));
        }

        let message_id = chunk_message_id();
        let count = chunks.len() as u8;
        for (seq, chunk) in chunks.iter().enumerate() {
            let mut datagram = Vec::with_capacity(12 + chunk.len());
            datagram.extend_from_slice(&CHUNK_MAGIC);
            datagram.extend_from_slice(&message_id);
            datagram.push(seq as u8);
            datagram.push(count);
            datagram.extend_from_slice(chunk);
            self.socket.send(&datagram).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LogSink for UdpGelfSink {
    async fn send(&self, message: &GelfMessage) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(message).map_err(SinkError::Encode)?;
        trace!(bytes = payload.len(), "sending gelf datagram");

        if payload.len() <= MAX_CHUNK_PAYLOAD {
            self.socket.send(&payload).await?;
        } else {
            self.send_chunked(&payload).await?;
        }
        Ok(())
    }
}

/// Message id for chunk reassembly: unique enough per collector window,
/// built from the nanosecond clock and a process-wide counter.
fn chunk_message_id() -> [u8; 8] {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    (nanos ^ count.rotate_left(48)).to_be_bytes()
}
