// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

use std::sync::Arc;

use anyhow::{Context, Result};
use ci_perf::collector::DEFAULT_MDM_TAG;
use ci_perf::spool::{SpoolMetricSource, SpoolNodeLister};
use ci_perf::{
    AgentEnv, Collector, CollectorMode, CollectorOptions, ConsoleSink, ExtensionConfigClient,
    ExtensionKind, LogReporter, PeriodicRunner, Sink, StreamRoutingCache, TelemetryReporter,
};
use log::info;
use tokio::signal::unix::{SignalKind, signal};

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = AgentEnv::from_env();
    simple_logger::init_with_level(env.log_level)?;
    info!("Log level set to: {:?}", env.log_level);

    let client = ExtensionConfigClient::new(
        env.extension_socket_path(),
        ExtensionKind::ContainerInsights,
    );
    info!("Using extension socket path: {}", client.socket_path().display());
    let routing = Arc::new(StreamRoutingCache::new(Arc::new(client)));
    let sink: Arc<dyn Sink> = Arc::new(ConsoleSink::stdout());
    let telemetry: Arc<dyn TelemetryReporter> = Arc::new(LogReporter);

    let mut options = CollectorOptions::new("cadvisor_perf", &env).with_mdm_tag(DEFAULT_MDM_TAG);
    // Windows nodes keep the default tags
    options.aad_msi_auth_mode &= !env.is_windows;
    let mut runners = vec![PeriodicRunner::new(Collector::new(
        options,
        CollectorMode::SingleNode,
        routing.clone(),
        Box::new(SpoolMetricSource::new(&env.spool_dir)),
        sink.clone(),
        telemetry.clone(),
    ))];

    // Remote node collection only runs when a node list is provided
    let lister = SpoolNodeLister::new(&env.spool_dir);
    if lister.exists() {
        runners.push(PeriodicRunner::new(Collector::new(
            CollectorOptions::new("win_cadvisor_perf", &env).with_mdm_tag(DEFAULT_MDM_TAG),
            CollectorMode::MultiNode(Box::new(lister)),
            routing,
            Box::new(SpoolMetricSource::new(&env.spool_dir)),
            sink,
            telemetry,
        )));
    }

    for runner in &mut runners {
        runner.start().context("Failed to start collector")?;
    }
    info!(
        "Started {} collectors reading from {}",
        runners.len(),
        env.spool_dir.display()
    );

    wait_for_shutdown().await?;

    tokio::task::spawn_blocking(move || {
        for mut runner in runners {
            runner.shutdown();
        }
    })
    .await
    .context("Failed to stop collectors")?;
    info!("All collectors stopped");
    Ok(())
}
