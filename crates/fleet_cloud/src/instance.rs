//! Raw inventory records and the [`FleetInstance`] projection.

use fleet_component::Component;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pricing;

/// Credit balance below which a burstable instance is considered exhausted.
pub const CREDIT_EXHAUSTION_THRESHOLD: f64 = 10.0;

/// Lifecycle state of a cloud instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
}

impl PowerState {
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A key/value tag attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// One instance as listed by the provider, before projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInstance {
    pub instance_id: String,
    pub instance_type: String,
    pub state: PowerState,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl RawInstance {
    /// Value of the `Name` tag, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == "Name")
            .map(|tag| tag.value.as_str())
    }
}

/// CPU metrics averaged over the requested window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceMetrics {
    /// Average utilization in percent.
    pub cpu_utilization: f64,
    /// Latest credit balance. Only reported for burstable classes.
    #[serde(default)]
    pub cpu_credit_balance: Option<f64>,
}

/// Telemetry as applied to a [`FleetInstance`].
pub type Telemetry = InstanceMetrics;

/// What one poll learned about one instance.
///
/// `telemetry` is `None` when metrics could not be fetched; the existing
/// telemetry fields are then left as they are.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub instance: FleetInstance,
    pub telemetry: Option<Telemetry>,
}

impl Observation {
    #[must_use]
    pub fn new(raw: &RawInstance, telemetry: Option<Telemetry>) -> Self {
        Self {
            instance: FleetInstance::from_raw(raw),
            telemetry,
        }
    }
}

/// The projection of a cloud VM that the simulation binds an entity to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetInstance {
    pub instance_id: String,
    pub instance_class: String,
    pub power_state: PowerState,
    pub name: String,
    pub cluster: Option<String>,
    pub stack: Option<String>,
    pub environment: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub has_credits: bool,
    pub cpu_utilization: f64,
    pub cpu_credit_balance: Option<f64>,
}

impl FleetInstance {
    /// Project a raw record. Telemetry starts at zero utilization and an
    /// unknown credit balance.
    #[must_use]
    pub fn from_raw(raw: &RawInstance) -> Self {
        let name = raw.name().unwrap_or_default().to_owned();
        let (cluster, stack, environment) = split_name(&name);
        Self {
            instance_id: raw.instance_id.clone(),
            instance_class: raw.instance_type.clone(),
            power_state: raw.state,
            name,
            cluster,
            stack,
            environment,
            private_ip: raw.private_ip.clone(),
            public_ip: raw.public_ip.clone(),
            has_credits: pricing::is_burstable(&raw.instance_type),
            cpu_utilization: 0.0,
            cpu_credit_balance: None,
        }
    }

    /// Build from an observation, applying its telemetry if present.
    #[must_use]
    pub fn from_observation(observation: &Observation) -> Self {
        let mut instance = observation.instance.clone();
        if let Some(telemetry) = observation.telemetry {
            instance.apply_telemetry(telemetry);
        }
        instance
    }

    /// Update this instance in place from a newer observation of the same ID.
    ///
    /// Returns `true` if anything visible changed.
    pub fn merge(&mut self, observation: &Observation) -> bool {
        let before = self.clone();
        let cpu_utilization = self.cpu_utilization;
        let cpu_credit_balance = self.cpu_credit_balance;

        *self = observation.instance.clone();
        self.cpu_utilization = cpu_utilization;
        self.cpu_credit_balance = cpu_credit_balance;
        if let Some(telemetry) = observation.telemetry {
            self.apply_telemetry(telemetry);
        }

        *self != before
    }

    /// Non-finite datapoints are dropped and the previous value kept.
    fn apply_telemetry(&mut self, telemetry: Telemetry) {
        if telemetry.cpu_utilization.is_finite() {
            self.cpu_utilization = telemetry.cpu_utilization.clamp(0.0, 100.0);
        } else {
            warn!(
                instance_id = %self.instance_id,
                value = telemetry.cpu_utilization,
                "ignoring non-finite cpu utilization"
            );
        }
        match telemetry.cpu_credit_balance {
            Some(balance) if balance.is_finite() => {
                self.cpu_credit_balance = Some(balance.max(0.0));
            }
            Some(balance) => warn!(
                instance_id = %self.instance_id,
                value = balance,
                "ignoring non-finite cpu credit balance"
            ),
            None => {}
        }
    }

    /// True if this instance is running and belongs to a cluster.
    #[must_use]
    pub fn is_groupable(&self) -> bool {
        self.power_state.is_running() && self.cluster.is_some()
    }

    /// True if `other` is a sibling: same cluster, and both running.
    #[must_use]
    pub fn is_sibling_of(&self, other: &FleetInstance) -> bool {
        self.instance_id != other.instance_id
            && self.is_groupable()
            && other.is_groupable()
            && self.cluster == other.cluster
    }

    /// Wellbeing in `[0, 1]`.
    ///
    /// Non-running instances are always healthy. A burstable instance whose
    /// credit balance is known and below the exhaustion threshold has zero
    /// health. Otherwise health falls linearly with utilization.
    #[must_use]
    pub fn health(&self) -> f32 {
        if !self.power_state.is_running() {
            return 1.0;
        }
        let exhausted = self
            .cpu_credit_balance
            .is_some_and(|balance| balance < CREDIT_EXHAUSTION_THRESHOLD);
        if self.has_credits && exhausted {
            return 0.0;
        }
        (1.0 - self.cpu_utilization / 100.0).clamp(0.0, 1.0) as f32
    }
}

impl Component for FleetInstance {
    fn type_name() -> &'static str {
        "FleetInstance"
    }
}

/// Split a `cluster.stack.environment` name. Names without a `.` are not
/// grouped, so all three parts stay unset.
fn split_name(name: &str) -> (Option<String>, Option<String>, Option<String>) {
    if !name.contains('.') {
        return (None, None, None);
    }
    let mut parts = name.splitn(3, '.').map(|part| {
        if part.is_empty() {
            None
        } else {
            Some(part.to_owned())
        }
    });
    let cluster = parts.next().flatten();
    let stack = parts.next().flatten();
    let environment = parts.next().flatten();
    (cluster, stack, environment)
}
