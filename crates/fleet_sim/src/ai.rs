//! Per-entity AI: a two-state machine that turns fleet telemetry into
//! steering.
//!
//! - **Idle** spins the body around +Y at a rate proportional to CPU load, and
//!   switches to **Cluster** once the entity's group has formed away from it.
//! - **Cluster** steers towards the entity's formation slot around the group
//!   centroid while keeping clear of siblings, and returns to **Idle** on
//!   arrival.
//!
//! State transitions run at a throttled 10 Hz; steering is evaluated every
//! physics tick.

use std::collections::HashMap;
use std::f32::consts::SQRT_2;

use fleet_cloud::FleetInstance;
use fleet_component::{Component, Entity};
use fleet_math::{Mat3, Quat, Transform, Vec3};

use crate::components::Body;
use crate::formation::{assign_slots, Pattern, SLOT_SPACING_SCALE};
use crate::physics::horizontal;
use crate::steering::{arrive, separation, Arrive, SteeringOutput, SEPARATION_RANGE};
use crate::world::World;

/// Seconds between state-machine updates.
pub const UPDATE_INTERVAL: f32 = 0.1;

/// Minimum CPU utilization (percent) that makes an idle entity spin.
pub const SPIN_MIN_UTILIZATION: f64 = 5.0;

/// Target spin rate is `utilization / SPIN_RATE_DIVISOR` rad/s.
pub const SPIN_RATE_DIVISOR: f32 = 80.0;

/// Angular acceleration applied while below the target spin rate.
pub const SPIN_ACCELERATION: f32 = 2.0;

/// An idle entity only starts clustering with at least this many siblings.
pub const MIN_SIBLINGS: usize = 2;

/// AI state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AiState {
    #[default]
    Idle,
    /// Heading for `anchor + offset`, where `anchor` is the group centroid
    /// and `offset` the entity's formation slot.
    Cluster { anchor: Vec3, offset: Vec3 },
}

impl AiState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Cluster { .. } => "cluster",
        }
    }
}

/// AI controller component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Controller {
    pub state: AiState,
    /// Time carried towards the next update.
    accumulator: f32,
    updates: u64,
}

impl Controller {
    /// Add `dt` to the throttle and return how many updates are now due.
    ///
    /// The remainder is carried, so over any interval the number of updates
    /// is `floor(elapsed / UPDATE_INTERVAL)` give or take one.
    pub fn advance(&mut self, dt: f32) -> u32 {
        if !dt.is_finite() || dt <= 0.0 {
            return 0;
        }
        self.accumulator += dt;
        let mut due = 0;
        while self.accumulator >= UPDATE_INTERVAL {
            self.accumulator -= UPDATE_INTERVAL;
            due += 1;
        }
        due
    }

    /// Total state-machine updates run so far.
    #[must_use]
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl Component for Controller {
    fn type_name() -> &'static str {
        "Controller"
    }
}

/// What the AI reads about its own entity.
#[derive(Debug, Clone, Copy)]
pub struct Agent<'a> {
    pub entity: Entity,
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub instance: &'a FleetInstance,
}

impl<'a> Agent<'a> {
    /// Read an agent from the world. Entities without a transform or fleet
    /// instance have nothing to steer.
    #[must_use]
    pub fn read(world: &'a World, entity: Entity) -> Option<Self> {
        let transform: &Transform = world.transforms.get(entity)?;
        let instance = world.instances.get(entity)?;
        let (linear_velocity, angular_velocity) = world
            .bodies
            .get(entity)
            .map_or((Vec3::ZERO, Vec3::ZERO), |b| (b.linear_velocity, b.angular_velocity));
        Some(Self {
            entity,
            position: transform.position,
            orientation: transform.orientation,
            scale: transform.scale(),
            linear_velocity,
            angular_velocity,
            instance,
        })
    }

    fn size(&self) -> f32 {
        self.scale.x
    }
}

/// One running member of a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Member {
    pub entity: Entity,
    pub position: Vec3,
    pub size: f32,
}

/// The running members of one cluster, with their formation slots.
#[derive(Debug, Clone, Default)]
pub struct Group {
    /// Members in entity-ID order.
    members: Vec<Member>,
    offsets: HashMap<Entity, Vec3>,
}

impl Group {
    fn new(mut members: Vec<Member>) -> Self {
        members.sort_by_key(|m| m.entity);
        let entities: Vec<Entity> = members.iter().map(|m| m.entity).collect();
        let spacing = SLOT_SPACING_SCALE * members.iter().map(|m| m.size).fold(0.0, f32::max);
        let pattern = Pattern::for_group(members.len(), spacing);
        let assignments = assign_slots(&entities);
        let drift = pattern.drift_offset(&assignments);
        let offsets = assignments
            .iter()
            .map(|a| (a.entity, pattern.slot_location(a.slot) - drift))
            .collect();
        Self { members, offsets }
    }

    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.offsets.contains_key(&entity)
    }

    /// Number of members other than `entity`.
    #[must_use]
    pub fn sibling_count(&self, entity: Entity) -> usize {
        self.members.len() - usize::from(self.contains(entity))
    }

    /// Positions of every member except `entity`.
    pub fn sibling_positions(&self, entity: Entity) -> impl Iterator<Item = Vec3> + '_ {
        self.members
            .iter()
            .filter(move |m| m.entity != entity)
            .map(|m| m.position)
    }

    /// Centroid of all members, `entity` included.
    #[must_use]
    pub fn centroid(&self) -> Option<Vec3> {
        fleet_math::centroid(self.members.iter().map(|m| m.position))
    }

    /// Formation offset of `entity` relative to the centroid.
    #[must_use]
    pub fn offset(&self, entity: Entity) -> Option<Vec3> {
        self.offsets.get(&entity).copied()
    }
}

/// Every cluster in the world, keyed by cluster name.
#[derive(Debug, Clone, Default)]
pub struct Groups {
    groups: HashMap<String, Group>,
}

impl Groups {
    /// Collect running, clustered instances that have a transform. Each
    /// instance joins the first group whose founder it is a sibling of.
    #[must_use]
    pub fn build(world: &World) -> Self {
        let mut clusters: Vec<(&FleetInstance, Vec<Member>)> = Vec::new();
        for (entity, instance) in world.instances.iter() {
            if !instance.is_groupable() {
                continue;
            }
            let Some(transform) = world.transforms.get(entity) else {
                continue;
            };
            let member = Member {
                entity,
                position: transform.position,
                size: transform.scale().x,
            };
            match clusters
                .iter_mut()
                .find(|(founder, _)| founder.is_sibling_of(instance))
            {
                Some((_, members)) => members.push(member),
                None => clusters.push((instance, vec![member])),
            }
        }
        Self {
            groups: clusters
                .into_iter()
                .filter_map(|(founder, members)| {
                    Some((founder.cluster.clone()?, Group::new(members)))
                })
                .collect(),
        }
    }

    /// The group `agent` belongs to, if it is a running clustered instance.
    #[must_use]
    pub fn for_agent(&self, agent: &Agent<'_>) -> Option<&Group> {
        if !agent.instance.is_groupable() {
            return None;
        }
        let group = self.groups.get(agent.instance.cluster.as_deref()?)?;
        group.contains(agent.entity).then_some(group)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Compute the next state.
#[must_use]
pub fn transition(state: &AiState, agent: &Agent<'_>, group: Option<&Group>) -> AiState {
    let formation = group.and_then(|g| {
        if g.sibling_count(agent.entity) < MIN_SIBLINGS {
            return None;
        }
        Some((g.centroid()?, g.offset(agent.entity)?))
    });
    let size = agent.size();

    match (state, formation) {
        (_, None) => AiState::Idle,
        (AiState::Idle, Some((anchor, offset))) => {
            let spread = horizontal(anchor - agent.position).length();
            let off_slot = horizontal(anchor + offset - agent.position).length();
            if spread > SQRT_2 * size && off_slot >= size {
                AiState::Cluster { anchor, offset }
            } else {
                AiState::Idle
            }
        }
        (AiState::Cluster { .. }, Some((anchor, offset))) => {
            if horizontal(anchor + offset - agent.position).length() < size {
                AiState::Idle
            } else {
                AiState::Cluster { anchor, offset }
            }
        }
    }
}

/// Compute the steering request for this tick.
#[must_use]
pub fn steering(state: &AiState, agent: &Agent<'_>, group: Option<&Group>) -> SteeringOutput {
    match *state {
        AiState::Idle => {
            let utilization = agent.instance.cpu_utilization;
            let target_rate = utilization as f32 / SPIN_RATE_DIVISOR;
            if utilization >= SPIN_MIN_UTILIZATION && agent.angular_velocity.length() < target_rate
            {
                SteeringOutput::angular(Vec3::Y * SPIN_ACCELERATION)
            } else {
                SteeringOutput::ZERO
            }
        }
        AiState::Cluster { anchor, offset } => {
            let size = agent.size();
            let params = Arrive::for_scale(size);
            let mut linear = arrive(
                agent.position,
                agent.linear_velocity,
                anchor + offset,
                &params,
            );
            if let Some(group) = group {
                linear += separation(
                    agent.position,
                    group.sibling_positions(agent.entity),
                    SEPARATION_RANGE * size,
                    params.max_acceleration,
                );
            }
            SteeringOutput::linear(linear)
        }
    }
}

/// Run every controller: throttled transitions, then steering applied to the
/// entity's body. Returns the number of state updates run.
pub fn step(world: &mut World, dt: f32) -> usize {
    let groups = Groups::build(world);
    let mut plans = Vec::with_capacity(world.controllers.len());
    let mut updates = 0;

    for (entity, controller) in world.controllers.iter() {
        let Some(agent) = Agent::read(world, entity) else {
            continue;
        };
        let group = groups.for_agent(&agent);
        let mut next = controller.clone();
        for _ in 0..next.advance(dt) {
            next.state = transition(&next.state, &agent, group);
            next.updates += 1;
            updates += 1;
        }
        let output = steering(&next.state, &agent, group);
        plans.push((entity, next, output, agent.orientation));
    }

    for (entity, next, output, orientation) in plans {
        if let Some(controller) = world.controllers.get_mut(entity) {
            *controller = next;
        }
        if output.is_zero() {
            continue;
        }
        if let Some(body) = world.bodies.get_mut(entity) {
            apply(body, orientation, output);
        }
    }
    updates
}

/// Scale accelerations by mass and inertia and accumulate them on `body`.
fn apply(body: &mut Body, orientation: Quat, output: SteeringOutput) {
    body.add_force(output.linear * body.mass());
    let rotation = Mat3::from_quat(orientation);
    let local = rotation.transpose() * output.angular;
    body.add_torque(rotation * (body.inertia() * local));
}
