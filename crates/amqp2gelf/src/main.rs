// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use gelf_relay::{
    config::Config,
    relay::DeliveryLoop,
    shutdown::{self, ShutdownCoordinator},
    sink::{LogSink, UdpGelfSink},
    source::amqp::AmqpQueueSource,
    PROGRAM_NAME, PROGRAM_VERSION,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = Config::from_env();

    let default_level = if config.verbose { "debug" } else { "info" };
    let env_filter =
        env::var("RUST_LOG").unwrap_or_else(|_| format!("lapin=warn,{default_level}"));

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("starting {PROGRAM_NAME} {PROGRAM_VERSION}");

    let (coordinator, shutdown_handle) = ShutdownCoordinator::new();

    // OS interrupts enter the same rendezvous as pipeline failures, with a
    // bounded grace period before the process is force-killed.
    tokio::spawn(shutdown::watch_os_signals(shutdown_handle.clone()));

    let sink: Arc<dyn LogSink> =
        match UdpGelfSink::connect(&config.gelf_host, config.gelf_port).await {
            Ok(sink) => Arc::new(sink),
            Err(err) => {
                error!(error = %err, "cannot create gelf writer");
                return ExitCode::FAILURE;
            }
        };

    // Startup failures are fatal before the delivery loop exists, so they
    // bypass the rendezvous entirely.
    let source = match AmqpQueueSource::connect(&config, shutdown_handle.clone()).await {
        Ok(source) => source,
        Err(err) => {
            error!(error = %err, "fatal error connecting to AMQP broker");
            return ExitCode::FAILURE;
        }
    };

    info!(
        queue = %config.queue_name,
        collector = %format!("{}:{}", config.gelf_host, config.gelf_port),
        "relay started"
    );

    tokio::spawn(DeliveryLoop::new(source, sink, shutdown_handle).run());

    let reason = coordinator.wait().await;
    info!("shutting down: {reason}");
    ExitCode::SUCCESS
}
