// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shutdown coordination.
//!
//! Termination signals from any task fan into a single-winner rendezvous:
//! an atomically-set reason slot plus a cancellation token. The first signal
//! wins; later senders return immediately and never block.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Why the pipeline is shutting down. Only the first reason received is
/// ever acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Operating-system interrupt, with the signal name.
    Interrupt(String),
    /// A sink write failed; a broken collector halts ingestion.
    SinkFailure(String),
    /// The broker closed the connection unexpectedly.
    SourceConnectionLost(String),
    /// The inbound message sequence ended.
    SourceClosed,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt(signal) => write!(f, "received signal {signal}"),
            Self::SinkFailure(err) => write!(f, "cannot send gelf message: {err}"),
            Self::SourceConnectionLost(err) => {
                write!(f, "AMQP server closed connection: {err}")
            }
            Self::SourceClosed => write!(f, "message source closed"),
        }
    }
}

struct Rendezvous {
    reason: OnceLock<ShutdownReason>,
    token: CancellationToken,
}

/// Consumer side of the rendezvous, held by the main task.
pub struct ShutdownCoordinator {
    inner: Arc<Rendezvous>,
}

/// Sender side of the rendezvous. Cheap to clone; each watcher task owns one.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<Rendezvous>,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> (Self, ShutdownHandle) {
        let inner = Arc::new(Rendezvous {
            reason: OnceLock::new(),
            token: CancellationToken::new(),
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            ShutdownHandle { inner },
        )
    }

    /// Waits for the first termination signal and returns its reason.
    pub async fn wait(&self) -> ShutdownReason {
        self.inner.token.cancelled().await;
        loop {
            // signal() fills the slot before cancelling the token, so this
            // resolves on the first iteration.
            if let Some(reason) = self.inner.reason.get() {
                return reason.clone();
            }
            tokio::task::yield_now().await;
        }
    }
}

impl ShutdownHandle {
    /// Records a termination reason. The first caller wins; every later
    /// signal is discarded without blocking.
    pub fn signal(&self, reason: ShutdownReason) {
        if self.inner.reason.set(reason).is_ok() {
            self.inner.token.cancel();
        }
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

/// Hard upper bound on shutdown latency after an OS interrupt.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Waits for an OS interrupt, signals shutdown, and force-exits the process
/// if it is still alive once the grace period elapses.
pub async fn watch_os_signals(handle: ShutdownHandle) {
    let signal_name = wait_for_signal().await;
    handle.signal(ShutdownReason::Interrupt(signal_name));

    enforce_grace_period(|| {
        error!("shutdown was ignored, bailing out now");
        std::process::exit(1);
    })
    .await;
}

/// Runs `bail` once the grace period elapses. In a well-behaved shutdown the
/// process exits first and the surrounding task is torn down with it.
async fn enforce_grace_period<F: FnOnce()>(bail: F) {
    tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
    bail();
}

#[cfg(unix)]
async fn wait_for_signal() -> String {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT".to_string(),
                _ = sigterm.recv() => "SIGTERM".to_string(),
            }
        }
        Err(err) => {
            warn!(error = %err, "cannot install SIGTERM handler, watching SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT".to_string()
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> String {
    let _ = tokio::signal::ctrl_c().await;
    "interrupt".to_string()
}
