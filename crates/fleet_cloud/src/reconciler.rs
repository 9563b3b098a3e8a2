//! Periodic reconciliation of the cloud inventory.
//!
//! Each poll lists the inventory, fetches CPU metrics for every live instance
//! concurrently, and hands the result to the simulation as a [`FleetSnapshot`]
//! over a channel. The simulation applies snapshots between ticks, so nothing
//! here touches the world directly.

use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::directory::InstanceDirectory;
use crate::error::CloudError;
use crate::instance::{Observation, PowerState};
use crate::provider::CloudProvider;

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between polls. The first poll runs immediately.
    pub period: Duration,
    /// Trailing window over which CPU metrics are averaged.
    pub metrics_window: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            metrics_window: Duration::from_secs(600),
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_metrics_window(mut self, window: Duration) -> Self {
        self.metrics_window = window;
        self
    }
}

/// The full set of live instances seen by one poll.
///
/// Instances missing from `observations` are to be deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetSnapshot {
    /// Sequence number of the poll that produced this snapshot.
    pub poll_id: u64,
    pub observations: Vec<Observation>,
}

/// Drives a [`CloudProvider`] on a fixed period.
pub struct Reconciler<P> {
    provider: P,
    config: ReconcilerConfig,
    directory: InstanceDirectory,
    sink: mpsc::Sender<FleetSnapshot>,
    poll_id: u64,
}

impl<P: CloudProvider> Reconciler<P> {
    pub fn new(
        provider: P,
        config: ReconcilerConfig,
        directory: InstanceDirectory,
        sink: mpsc::Sender<FleetSnapshot>,
    ) -> Self {
        Self {
            provider,
            config,
            directory,
            sink,
            poll_id: 0,
        }
    }

    /// Fetch inventory and metrics once.
    ///
    /// Terminated instances are left out. A metrics failure for an instance
    /// yields an observation without telemetry rather than failing the poll.
    pub async fn poll(&mut self) -> Result<FleetSnapshot, CloudError> {
        let inventory = self.provider.list_instances().await?;
        let live: Vec<_> = inventory
            .into_iter()
            .filter(|raw| raw.state != PowerState::Terminated)
            .collect();

        let window = self.config.metrics_window;
        let metrics = join_all(
            live.iter()
                .map(|raw| self.provider.instance_metrics(&raw.instance_id, window)),
        )
        .await;

        let mut missing = 0usize;
        let observations: Vec<Observation> = live
            .iter()
            .zip(metrics)
            .map(|(raw, result)| {
                let telemetry = match result {
                    Ok(m) => Some(m),
                    Err(err) => {
                        missing += 1;
                        debug!(instance_id = %raw.instance_id, error = %err, "metrics unavailable");
                        None
                    }
                };
                Observation::new(raw, telemetry)
            })
            .collect();

        if missing > 0 {
            warn!(
                missing,
                total = observations.len(),
                "metrics fetch incomplete, keeping previous telemetry"
            );
        }

        self.poll_id += 1;
        Ok(FleetSnapshot {
            poll_id: self.poll_id,
            observations,
        })
    }

    /// Poll every period until `shutdown` flips or the simulation goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            period_secs = self.config.period.as_secs_f64(),
            window_secs = self.config.metrics_window.as_secs(),
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let started = Instant::now();
            let polled = tokio::select! {
                polled = self.poll() => polled,
                () = async {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                } => {
                    info!("shutdown during poll, abandoning it");
                    break;
                }
            };
            let snapshot = match polled {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(error = %err, "inventory poll failed, keeping previous world");
                    continue;
                }
            };

            self.directory.apply(&snapshot.observations);
            let poll_id = snapshot.poll_id;
            let instances = snapshot.observations.len();
            if self.sink.send(snapshot).await.is_err() {
                info!("simulation stopped, reconciler exiting");
                return;
            }

            info!(
                poll_id,
                instances,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "reconciled fleet"
            );
        }

        info!("reconciler stopped");
    }
}
