//! # fleet_app — Fleet visualizer server
//!
//! Polls a cloud provider for its compute fleet, simulates every instance as
//! a physical body, and streams the world to browsers over websockets.
//!
//! ## Startup Sequence
//!
//! 1. Parse configuration and check the static client directory.
//! 2. Bind the HTTP listener.
//! 3. Spawn the reconciler, the HTTP server and the tick loop.
//! 4. Run until Ctrl-C or until the tick loop fails, then shut everything down.

mod config;
mod http;
mod hub;
mod tick;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fleet_cloud::{
    CloudProvider, FileProvider, FleetSnapshot, InstanceDirectory, MockProvider, Reconciler,
    ReconcilerConfig,
};
use fleet_sim::Simulation;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use http::AppState;
use hub::Hub;
use tick::TickLoop;

/// Snapshots waiting for the simulation. Polls are minutes apart.
const SNAPSHOT_QUEUE: usize = 4;

/// Websocket handshakes waiting for the simulation.
const CONNECTION_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fleet_app=info".parse()?)
                .add_directive("fleet_cloud=info".parse()?)
                .add_directive("fleet_sim=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let config = Config::parse();
    info!(listen = %config.listen, "fleet visualizer starting");

    if !config.static_dir.is_dir() {
        bail!(
            "static directory not found: {}",
            config.static_dir.display()
        );
    }

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    info!(addr = %listener.local_addr()?, "listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_QUEUE);
    let (connection_tx, connection_rx) = mpsc::channel(CONNECTION_QUEUE);
    let directory = InstanceDirectory::new();

    let reconciler = match &config.inventory_file {
        Some(path) => {
            info!(path = %path.display(), region = ?config.region, "using inventory file");
            let mut provider = FileProvider::new(path);
            if let Some(region) = &config.region {
                provider = provider.with_region(region);
            }
            spawn_reconciler(
                provider,
                config.reconciler(),
                directory.clone(),
                snapshot_tx,
                shutdown_rx.clone(),
            )
        }
        None => {
            warn!("no inventory file configured, fleet will stay empty");
            spawn_reconciler(
                MockProvider::new(),
                config.reconciler(),
                directory.clone(),
                snapshot_tx,
                shutdown_rx.clone(),
            )
        }
    };

    let hub = Hub::new(config.hub());
    let state = AppState {
        connections: connection_tx,
        directory,
        client_queue: hub.config().client_queue,
    };
    let app = http::router(state, &config.static_dir);
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let tick_loop = TickLoop::new(
        config.tick(),
        Simulation::new(config.sim()),
        hub,
        snapshot_rx,
        connection_rx,
    );
    let mut ticking = tokio::spawn(tick_loop.run(shutdown_rx));

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("shutdown requested");
            None
        }
        result = &mut ticking => Some(result),
    };

    let _ = shutdown_tx.send(true);
    let outcome = match finished {
        Some(result) => result,
        None => ticking.await,
    }
    .context("tick loop panicked")?;

    if let Err(err) = reconciler.await {
        warn!(error = %err, "reconciler task failed");
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "http server failed"),
        Err(err) => warn!(error = %err, "http server task failed"),
    }

    if let Err(err) = &outcome {
        error!(error = %format!("{err:#}"), "simulation aborted");
    }
    info!("fleet visualizer shut down");
    outcome
}

fn spawn_reconciler<P: CloudProvider>(
    provider: P,
    config: ReconcilerConfig,
    directory: InstanceDirectory,
    sink: mpsc::Sender<FleetSnapshot>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let reconciler = Reconciler::new(provider, config, directory, sink);
    tokio::spawn(reconciler.run(shutdown))
}
