//! Simulation tick loop.
//!
//! Every tick runs the same lifecycle on the simulation task:
//!
//! 1. Apply fleet snapshots posted by the reconciler.
//! 2. Accept websocket clients posted by the HTTP layer.
//! 3. Step the simulation (AI, physics, collision).
//! 4. Broadcast delta and dead frames.
//!
//! Ticks run at a fixed rate with a fixed `dt`. When the loop falls behind,
//! missed ticks are skipped rather than replayed.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fleet_cloud::FleetSnapshot;
use fleet_sim::{Simulation, StepStats};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hub::{BroadcastStats, Connection, Hub};

/// Configuration for the tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Wall-clock length of one tick.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate)
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickStats {
    pub snapshots: usize,
    pub accepted: usize,
    pub step: StepStats,
    pub broadcast: BroadcastStats,
}

/// The simulation task's state.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    sim: Simulation,
    hub: Hub,
    snapshots: mpsc::Receiver<FleetSnapshot>,
    connections: mpsc::Receiver<Connection>,
}

impl TickLoop {
    #[must_use]
    pub fn new(
        config: TickConfig,
        sim: Simulation,
        hub: Hub,
        snapshots: mpsc::Receiver<FleetSnapshot>,
        connections: mpsc::Receiver<Connection>,
    ) -> Self {
        Self {
            tick_id: 0,
            config,
            sim,
            hub,
            snapshots,
            connections,
        }
    }

    #[cfg(test)]
    fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[cfg(test)]
    fn sim(&self) -> &Simulation {
        &self.sim
    }

    #[cfg(test)]
    fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Run one tick with a step of `dt` seconds. Never waits.
    ///
    /// # Errors
    ///
    /// Fails if a snapshot corrupts the world or a frame cannot be encoded.
    /// Both are bugs; the caller is expected to shut down.
    pub fn tick(&mut self, dt: f32) -> Result<TickStats> {
        self.tick_id += 1;
        let mut stats = TickStats::default();

        while let Ok(snapshot) = self.snapshots.try_recv() {
            self.sim
                .apply_snapshot(&snapshot)
                .with_context(|| format!("applying fleet snapshot {}", snapshot.poll_id))?;
            stats.snapshots += 1;
        }

        while let Ok(connection) = self.connections.try_recv() {
            self.hub
                .accept(connection, self.sim.world())
                .context("encoding client snapshot")?;
            stats.accepted += 1;
        }

        stats.step = self.sim.step(dt);
        stats.broadcast = self
            .hub
            .tick(self.sim.world_mut())
            .with_context(|| format!("broadcasting tick {}", self.tick_id))?;

        debug!(
            tick_id = self.tick_id,
            snapshots = stats.snapshots,
            accepted = stats.accepted,
            ai_updates = stats.step.ai_updates,
            awake = stats.step.awake,
            contacts = stats.step.contacts,
            clients = stats.broadcast.clients,
            dead = stats.broadcast.dead,
            dropped = stats.broadcast.dropped,
            "tick complete"
        );
        Ok(stats)
    }

    /// Tick at the configured rate until `shutdown` flips, `max_ticks` is
    /// reached or a tick fails. The hub is closed on the way out.
    ///
    /// # Errors
    ///
    /// Propagates the first failing tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let period = self.config.period();
        let dt = period.as_secs_f32();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                    continue;
                }
            }

            let start = Instant::now();
            if let Err(err) = self.tick(dt) {
                break Err(err);
            }

            let elapsed = start.elapsed();
            if elapsed > period {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = period.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }

            if self.config.max_ticks > 0 && self.tick_id >= self.config.max_ticks {
                info!(ticks = self.tick_id, "tick loop complete");
                break Ok(());
            }
        };

        info!(
            ticks = self.tick_id,
            frames = self.hub.frame_counter(),
            clients = self.hub.len(),
            "tick loop stopped"
        );
        self.hub.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fleet_cloud::{
        InstanceDirectory, InstanceMetrics, MockProvider, PowerState, RawInstance, Reconciler,
        ReconcilerConfig, Tag,
    };
    use fleet_component::Entity;
    use fleet_math::{Transform, Vec3};
    use fleet_net::{DecodedFrame, EntityRecord, FrameKind, decode_message};
    use fleet_sim::SimConfig;
    use std::collections::HashMap;

    use crate::hub::HubConfig;

    const DT: f32 = 1.0 / 60.0;

    struct Harness {
        tick_loop: TickLoop,
        provider: MockProvider,
        reconciler: Reconciler<MockProvider>,
        snapshot_tx: mpsc::Sender<FleetSnapshot>,
        connect_tx: mpsc::Sender<Connection>,
    }

    impl Harness {
        fn new(hub: HubConfig) -> Self {
            let (snapshot_tx, snapshot_rx) = mpsc::channel(4);
            let (connect_tx, connect_rx) = mpsc::channel(4);
            let (sink, _) = mpsc::channel(1);
            let provider = MockProvider::new();
            let reconciler = Reconciler::new(
                provider.clone(),
                ReconcilerConfig::default(),
                InstanceDirectory::new(),
                sink,
            );
            let sim = Simulation::new(SimConfig {
                seed: Some(5),
                ..SimConfig::default()
            });
            Self {
                tick_loop: TickLoop::new(
                    TickConfig::default(),
                    sim,
                    Hub::new(hub),
                    snapshot_rx,
                    connect_rx,
                ),
                provider,
                reconciler,
                snapshot_tx,
                connect_tx,
            }
        }

        async fn reconcile(&mut self) {
            let snapshot = self.reconciler.poll().await.unwrap();
            self.snapshot_tx.send(snapshot).await.unwrap();
        }

        async fn connect(&self, capacity: usize) -> mpsc::Receiver<axum::body::Bytes> {
            let (connection, rx) = Connection::new(capacity);
            self.connect_tx.send(connection).await.unwrap();
            rx
        }

        fn tick(&mut self) -> TickStats {
            self.tick_loop.tick(DT).unwrap()
        }
    }

    fn micro(id: &str) -> RawInstance {
        RawInstance {
            instance_id: id.to_owned(),
            instance_type: "t2.micro".to_owned(),
            state: PowerState::Running,
            private_ip: None,
            public_ip: None,
            availability_zone: None,
            tags: vec![Tag {
                key: "Name".to_owned(),
                value: id.to_owned(),
            }],
        }
    }

    fn metrics(util: f64, credits: f64) -> InstanceMetrics {
        InstanceMetrics {
            cpu_utilization: util,
            cpu_credit_balance: Some(credits),
        }
    }

    fn frames(rx: &mut mpsc::Receiver<axum::body::Bytes>) -> Vec<(FrameKind, DecodedFrame)> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|bytes| decode_message(&bytes).unwrap())
            .collect()
    }

    /// Client-side view of the world, as a browser would keep it.
    #[derive(Default)]
    struct Mirror {
        entities: HashMap<Entity, EntityRecord>,
    }

    impl Mirror {
        fn apply(&mut self, rx: &mut mpsc::Receiver<axum::body::Bytes>) {
            for (kind, frame) in frames(rx) {
                for record in frame.records {
                    match kind {
                        FrameKind::Dead => {
                            self.entities.remove(&record.entity);
                        }
                        FrameKind::Snapshot | FrameKind::Delta => {
                            let entry = self
                                .entities
                                .entry(record.entity)
                                .or_insert(EntityRecord::id_only(record.entity));
                            entry.position = record.position.or(entry.position);
                            entry.orientation = record.orientation.or(entry.orientation);
                            entry.model = record.model.or(entry.model);
                            entry.scale = record.scale.or(entry.scale);
                            entry.health = record.health.or(entry.health);
                        }
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_bootstrap_snapshot() {
        let mut h = Harness::new(HubConfig::default());
        h.provider.set_instances(vec![micro("i-1")]).await;
        h.provider.set_metrics("i-1", metrics(50.0, 100.0)).await;
        h.reconcile().await;
        h.tick();

        let mut rx = h.connect(8).await;
        h.tick();
        let received = frames(&mut rx);
        let (kind, snapshot) = &received[0];
        assert_eq!(*kind, FrameKind::Snapshot);
        assert_eq!(snapshot.records.len(), 1);

        let record = snapshot.records[0];
        let size = record.scale.unwrap().x;
        assert_relative_eq!(size, 5.848_035, epsilon = 1e-4);
        assert_relative_eq!(record.position.unwrap().y, size / 2.0);
        assert_eq!(record.health, Some(0.5));
        assert_eq!(record.model, Some(1));
    }

    #[tokio::test]
    async fn test_credit_exhaustion_reaches_next_delta() {
        let mut h = Harness::new(HubConfig::default());
        h.provider.set_instances(vec![micro("i-1")]).await;
        // Below the spin threshold, so the body can fall asleep.
        h.provider.set_metrics("i-1", metrics(4.0, 100.0)).await;
        h.reconcile().await;
        let mut rx = h.connect(256).await;
        for _ in 0..90 {
            h.tick();
        }
        let entity = h.tick_loop.sim().world().find_instance("i-1").unwrap();
        assert!(
            !h.tick_loop
                .sim()
                .world()
                .get::<fleet_sim::Body>(entity)
                .unwrap()
                .is_awake()
        );
        frames(&mut rx);

        h.provider.set_metrics("i-1", metrics(4.0, 5.0)).await;
        h.reconcile().await;
        h.tick();
        let received = frames(&mut rx);
        let (kind, delta) = &received[0];
        assert_eq!(*kind, FrameKind::Delta);
        assert_eq!(delta.records[0].entity, entity);
        assert_eq!(delta.records[0].health, Some(0.0));
    }

    #[tokio::test]
    async fn test_non_finite_metrics_do_not_stop_the_loop() {
        let mut h = Harness::new(HubConfig::default());
        h.provider.set_instances(vec![micro("i-1")]).await;
        h.provider.set_metrics("i-1", metrics(f64::NAN, 100.0)).await;
        h.reconcile().await;
        let mut rx = h.connect(8).await;
        h.tick();

        let received = frames(&mut rx);
        let (kind, snapshot) = &received[0];
        assert_eq!(*kind, FrameKind::Snapshot);
        assert_eq!(snapshot.records[0].health, Some(1.0));

        h.provider.set_metrics("i-1", metrics(25.0, f64::NAN)).await;
        h.reconcile().await;
        h.tick();
        let received = frames(&mut rx);
        let (kind, delta) = &received[0];
        assert_eq!(*kind, FrameKind::Delta);
        assert_eq!(delta.records[0].health, Some(0.75));
    }

    #[tokio::test]
    async fn test_termination_sends_dead_frame() {
        let mut h = Harness::new(HubConfig::default());
        h.provider.set_instances(vec![micro("i-1")]).await;
        h.reconcile().await;
        let mut rx = h.connect(256).await;
        h.tick();
        let entity = h.tick_loop.sim().world().find_instance("i-1").unwrap();
        frames(&mut rx);

        h.provider.set_instances(vec![]).await;
        h.reconcile().await;
        h.tick();
        let received = frames(&mut rx);
        let dead: Vec<_> = received
            .iter()
            .filter(|(kind, _)| *kind == FrameKind::Dead)
            .collect();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1.records[0].entity, entity);

        let mut late = h.connect(8).await;
        h.tick();
        let received = frames(&mut late);
        let (kind, snapshot) = &received[0];
        assert_eq!(*kind, FrameKind::Snapshot);
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_precedes_delta_for_existing_entities() {
        let mut h = Harness::new(HubConfig::default());
        h.provider
            .set_instances(vec![micro("i-1"), micro("i-2")])
            .await;
        h.reconcile().await;
        h.tick();

        let mut rx = h.connect(8).await;
        h.tick();
        let received = frames(&mut rx);
        assert_eq!(received[0].0, FrameKind::Snapshot);
        let in_snapshot: Vec<Entity> = received[0].1.records.iter().map(|r| r.entity).collect();
        if let Some((kind, delta)) = received.get(1) {
            assert_eq!(*kind, FrameKind::Delta);
            for record in &delta.records {
                assert!(in_snapshot.contains(&record.entity));
                assert!(record.model.is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_clients_converge_on_same_world() {
        let mut h = Harness::new(HubConfig::default());
        h.provider
            .set_instances(vec![micro("web.a.prod"), micro("web.b.prod"), micro("solo")])
            .await;
        h.provider.set_metrics("solo", metrics(60.0, 100.0)).await;
        h.reconcile().await;

        let mut first_rx = h.connect(1024).await;
        let mut first = Mirror::default();
        for _ in 0..30 {
            h.tick();
            first.apply(&mut first_rx);
        }

        let mut second_rx = h.connect(1024).await;
        let mut second = Mirror::default();
        h.provider.set_instances(vec![micro("web.a.prod"), micro("solo")]).await;
        h.reconcile().await;
        for _ in 0..60 {
            h.tick();
            first.apply(&mut first_rx);
            second.apply(&mut second_rx);
        }

        let world = h.tick_loop.sim().world();
        assert_eq!(first.entities.len(), 2);
        assert_eq!(second.entities.len(), 2);
        for (entity, record) in &first.entities {
            let other = second.entities[entity];
            let transform = world.get::<Transform>(*entity).unwrap();
            assert_eq!(record.position, other.position);
            assert_eq!(record.position, Some(transform.position));
            assert_eq!(record.scale, Some(transform.scale()));
        }
    }

    #[tokio::test]
    async fn test_slow_client_does_not_hold_back_ticks() {
        let mut h = Harness::new(HubConfig {
            client_queue: 1,
            max_stalled_ticks: 5,
        });
        h.provider.set_metrics("i-1", metrics(90.0, 100.0)).await;
        h.provider.set_instances(vec![micro("i-1")]).await;
        h.reconcile().await;
        let _stuck = h.connect(1).await;
        let mut healthy = h.connect(64).await;

        let mut dropped = 0;
        for _ in 0..10 {
            dropped += h.tick().broadcast.dropped;
            frames(&mut healthy);
        }
        assert_eq!(dropped, 1);
        assert_eq!(h.tick_loop.hub().len(), 1);
        assert_eq!(h.tick_loop.tick_id(), 10);
    }

    #[tokio::test]
    async fn test_encoding_failure_is_fatal() {
        let mut h = Harness::new(HubConfig::default());
        h.provider.set_instances(vec![micro("i-1")]).await;
        h.reconcile().await;
        let _rx = h.connect(8).await;
        h.tick();

        let entity = h.tick_loop.sim().world().find_instance("i-1").unwrap();
        h.tick_loop
            .sim
            .world_mut()
            .get_mut::<Transform>(entity)
            .unwrap()
            .position = Vec3::new(f32::INFINITY, 0.0, 0.0);
        assert!(h.tick_loop.tick(DT).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_max_ticks() {
        let (_snapshot_tx, snapshots) = mpsc::channel(1);
        let (connect_tx, connections) = mpsc::channel(1);
        let tick_loop = TickLoop::new(
            TickConfig {
                tick_rate: 1000.0,
                max_ticks: 5,
            },
            Simulation::new(SimConfig::default()),
            Hub::new(HubConfig::default()),
            snapshots,
            connections,
        );
        let (connection, mut rx) = Connection::new(8);
        connect_tx.send(connection).await.unwrap();
        let (_shutdown_tx, shutdown) = watch::channel(false);

        tick_loop.run(shutdown).await.unwrap();
        assert_eq!(frames(&mut rx)[0].0, FrameKind::Snapshot);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (_snapshot_tx, snapshots) = mpsc::channel(1);
        let (_connect_tx, connections) = mpsc::channel(1);
        let tick_loop = TickLoop::new(
            TickConfig::default(),
            Simulation::new(SimConfig::default()),
            Hub::new(HubConfig::default()),
            snapshots,
            connections,
        );
        let (shutdown_tx, shutdown) = watch::channel(false);
        let handle = tokio::spawn(tick_loop.run(shutdown));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
