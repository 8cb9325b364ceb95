mod command;
mod config;
mod dispatch;
mod link;
mod observer;
mod publisher;
mod session;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use command::{
    AckTimeoutSweeper, CommandGateway, CommandReporter, CommandTracker, OUTBOUND_QUEUE,
};
use config::Cli;
use dispatch::Dispatcher;
use link::MavlinkConnector;
use observer::{ObserverHub, ObserverServer, RequestRouter};
use publisher::SnapshotPublisher;
use session::{SessionControl, SessionSupervisor};
use telemetry::TelemetryStore;

/// How long shutdown waits for the supervisor to close its link
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Cli::parse().into_config().context("invalid link address")?;

    info!("Bridge starting");
    info!("  Vehicle link: {}", config.target);
    info!("  Observers: {}", config.observer_addr);

    let store = Arc::new(TelemetryStore::new());
    let hub = ObserverHub::default();
    let tracker = Arc::new(CommandTracker::new(config.max_pending_commands));
    let reporter = Arc::new(CommandReporter::new(
        tracker.clone(),
        store.clone(),
        hub.clone(),
    ));

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let gateway = Arc::new(CommandGateway::new(
        store.clone(),
        reporter.clone(),
        outbound_tx,
    ));
    let control = Arc::new(SessionControl::new(
        config.target.clone(),
        config.session.stop_timeout(),
    ));

    let supervisor = SessionSupervisor::new(
        MavlinkConnector::new(config.gcs_system_id, config.gcs_component_id),
        control.clone(),
        config.session.clone(),
        store.clone(),
        Dispatcher::new(),
        reporter.clone(),
        hub.clone(),
        outbound_rx,
    )
    .start();

    let sweeper = AckTimeoutSweeper::new(reporter, config.ack_timeout, config.ack_sweep_interval)
        .start();
    let publisher =
        SnapshotPublisher::new(store.clone(), hub.clone(), config.snapshot_interval).start();

    let router = Arc::new(RequestRouter::new(gateway, control.clone()));
    let server = ObserverServer::bind(config.observer_addr, router, store, hub).await?;
    let server = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("[OBSERVER] Server stopped: {:#}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    control.shutdown();
    server.abort();
    publisher.abort();
    sweeper.abort();

    match tokio::time::timeout(SHUTDOWN_GRACE, supervisor).await {
        Ok(Ok(())) => info!("Bridge stopped"),
        Ok(Err(e)) => error!("Supervisor task failed: {}", e),
        Err(_) => warn!("Supervisor did not stop within {:?}", SHUTDOWN_GRACE),
    }
    Ok(())
}
