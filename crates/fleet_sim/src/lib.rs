//! # fleet_sim
//!
//! The authoritative simulation: an entity [`World`] advanced by fixed steps.
//!
//! Each [`Simulation::step`] runs, in order:
//!
//! 1. [`ai`] — throttled state transitions and per-tick steering.
//! 2. [`physics`] — semi-implicit Euler integration, sleep, ground clamp.
//! 3. [`collision`] — pairwise overlap tests and horizontal resolution.
//!
//! Fleet snapshots from the reconciler are merged between steps by
//! [`Simulation::apply_snapshot`]. The broadcast layer reads the result
//! through [`record`].

pub mod ai;
pub mod collision;
pub mod components;
pub mod error;
pub mod formation;
pub mod physics;
pub mod reconcile;
pub mod record;
pub mod steering;
pub mod world;

pub use ai::{AiState, Controller};
pub use components::{Body, Collision, Graphic, ModelKind, Shape};
pub use error::SimError;
pub use reconcile::{ReconcileSummary, SpawnConfig};
pub use world::World;

use fleet_cloud::FleetSnapshot;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, trace};

/// Configuration for a [`Simulation`].
#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    pub spawn: SpawnConfig,
    /// Seed for spawn scattering. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepStats {
    pub ai_updates: usize,
    pub contacts: usize,
    pub awake: usize,
}

/// A world plus the state needed to advance and repopulate it.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    spawn: SpawnConfig,
    rng: StdRng,
    tick_id: u64,
}

impl Simulation {
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world: World::new(),
            spawn: config.spawn,
            rng,
            tick_id: 0,
        }
    }

    /// Number of steps taken.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Merge a reconciler snapshot into the world.
    ///
    /// # Errors
    ///
    /// Returns [`SimError`] if the world rejects a freshly spawned entity.
    pub fn apply_snapshot(&mut self, snapshot: &FleetSnapshot) -> Result<ReconcileSummary, SimError> {
        let summary =
            reconcile::apply_snapshot(&mut self.world, snapshot, &self.spawn, &mut self.rng)?;
        info!(
            poll_id = snapshot.poll_id,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            live = self.world.len(),
            "applied fleet snapshot"
        );
        Ok(summary)
    }

    /// Advance the world by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> StepStats {
        self.tick_id += 1;
        let ai_updates = ai::step(&mut self.world, dt);
        physics::step(&mut self.world, dt);
        let contacts = collision::step(&mut self.world);
        let stats = StepStats {
            ai_updates,
            contacts,
            awake: physics::awake_count(&self.world),
        };
        trace!(
            tick_id = self.tick_id,
            ai_updates,
            contacts,
            awake = stats.awake,
            "step complete"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_cloud::{FleetInstance, InstanceMetrics, Observation, PowerState, RawInstance, Tag};
    use fleet_math::{Transform, Vec3};

    const DT: f32 = 1.0 / 60.0;

    fn observed(id: &str, name: &str, util: f64) -> Observation {
        let raw = RawInstance {
            instance_id: id.to_owned(),
            instance_type: "t2.micro".to_owned(),
            state: PowerState::Running,
            private_ip: None,
            public_ip: None,
            availability_zone: None,
            tags: vec![Tag {
                key: "Name".to_owned(),
                value: name.to_owned(),
            }],
        };
        Observation::new(
            &raw,
            Some(InstanceMetrics {
                cpu_utilization: util,
                cpu_credit_balance: Some(100.0),
            }),
        )
    }

    fn seeded() -> Simulation {
        Simulation::new(SimConfig {
            seed: Some(42),
            ..SimConfig::default()
        })
    }

    #[test]
    fn test_ground_clamp_holds_after_every_step() {
        let mut sim = seeded();
        sim.apply_snapshot(&FleetSnapshot {
            poll_id: 1,
            observations: (0..6)
                .map(|i| observed(&format!("i-{i}"), "web.api.prod", 40.0))
                .collect(),
        })
        .unwrap();

        for _ in 0..120 {
            sim.step(DT);
            for (_, t) in sim.world().iter::<Transform>() {
                assert_eq!(t.position.y, t.scale().y / 2.0);
            }
        }
    }

    #[test]
    fn test_cluster_converges_on_centroid() {
        let mut sim = seeded();
        sim.apply_snapshot(&FleetSnapshot {
            poll_id: 1,
            observations: vec![
                observed("i-1", "web.a.prod", 0.0),
                observed("i-2", "web.b.prod", 0.0),
                observed("i-3", "web.c.prod", 0.0),
            ],
        })
        .unwrap();

        let starts = [
            Vec3::new(-80.0, 0.0, -60.0),
            Vec3::new(75.0, 0.0, -40.0),
            Vec3::new(10.0, 0.0, 85.0),
        ];
        let entities: Vec<_> = sim.world().entities().collect();
        for (entity, start) in entities.iter().zip(starts) {
            sim.world_mut().get_mut::<Transform>(*entity).unwrap().position = start;
        }

        for _ in 0..600 {
            sim.step(DT);
        }

        let positions: Vec<Vec3> = entities
            .iter()
            .map(|e| sim.world().get::<Transform>(*e).unwrap().position)
            .collect();
        let centroid = fleet_math::centroid(positions.iter().copied()).unwrap();
        let scale = sim
            .world()
            .get::<Transform>(entities[0])
            .unwrap()
            .scale()
            .x;
        for p in positions {
            assert!(
                p.distance(centroid) <= 2.0 * scale,
                "{p} is {} from {centroid}",
                p.distance(centroid)
            );
        }
    }

    #[test]
    fn test_busy_idle_instance_spins() {
        let mut sim = seeded();
        sim.apply_snapshot(&FleetSnapshot {
            poll_id: 1,
            observations: vec![observed("i-1", "solo", 80.0)],
        })
        .unwrap();
        for _ in 0..60 {
            sim.step(DT);
        }
        let entity = sim.world().find_instance("i-1").unwrap();
        let body = sim.world().get::<Body>(entity).unwrap();
        assert!(body.is_awake());
        assert!(body.angular_velocity.y > 0.0);
    }

    #[test]
    fn test_quiet_instance_falls_asleep() {
        let mut sim = seeded();
        sim.apply_snapshot(&FleetSnapshot {
            poll_id: 1,
            observations: vec![observed("i-1", "solo", 0.0)],
        })
        .unwrap();
        for _ in 0..60 {
            sim.step(DT);
        }
        let entity = sim.world().find_instance("i-1").unwrap();
        assert!(!sim.world().get::<Body>(entity).unwrap().is_awake());
        assert_eq!(
            sim.world().get::<FleetInstance>(entity).unwrap().instance_id,
            "i-1"
        );
    }

    #[test]
    fn test_same_seed_same_world() {
        let snap = FleetSnapshot {
            poll_id: 1,
            observations: vec![observed("i-1", "a.b.c", 0.0), observed("i-2", "a.b.c", 0.0)],
        };
        let mut a = seeded();
        let mut b = seeded();
        a.apply_snapshot(&snap).unwrap();
        b.apply_snapshot(&snap).unwrap();
        let pa: Vec<Vec3> = a.world().iter::<Transform>().map(|(_, t)| t.position).collect();
        let pb: Vec<Vec3> = b.world().iter::<Transform>().map(|(_, t)| t.position).collect();
        assert_eq!(pa, pb);
    }
}
