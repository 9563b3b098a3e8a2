//! A concurrently readable view of the most recently reconciled instances.
//!
//! The simulation owns the authoritative world; this directory only serves
//! read-only queries (the `/api/instances` endpoint) without touching it.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::instance::{FleetInstance, Observation};

/// JSON view of one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub name: String,
    pub instance_id: String,
    pub instance_class: String,
    pub power_state: crate::instance::PowerState,
    pub has_credits: bool,
    pub cpu_utilization: f64,
    pub cpu_credit_balance: Option<f64>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub health: f32,
}

impl From<&FleetInstance> for InstanceSummary {
    fn from(instance: &FleetInstance) -> Self {
        Self {
            name: instance.name.clone(),
            instance_id: instance.instance_id.clone(),
            instance_class: instance.instance_class.clone(),
            power_state: instance.power_state,
            has_credits: instance.has_credits,
            cpu_utilization: instance.cpu_utilization,
            cpu_credit_balance: instance.cpu_credit_balance,
            private_ip: instance.private_ip.clone(),
            public_ip: instance.public_ip.clone(),
            health: instance.health(),
        }
    }
}

/// Instances keyed by ID. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InstanceDirectory {
    instances: Arc<DashMap<String, FleetInstance>>,
}

impl InstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a poll's observations and drop instances it no longer lists.
    pub fn apply(&self, observations: &[Observation]) {
        for observation in observations {
            self.instances
                .entry(observation.instance.instance_id.clone())
                .and_modify(|existing| {
                    existing.merge(observation);
                })
                .or_insert_with(|| FleetInstance::from_observation(observation));
        }
        self.instances.retain(|id, _| {
            observations
                .iter()
                .any(|observation| observation.instance.instance_id == *id)
        });
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, instance_id: &str) -> Option<FleetInstance> {
        self.instances.get(instance_id).map(|entry| entry.clone())
    }

    /// Every instance, ordered by name then ID.
    pub fn summaries(&self) -> Vec<InstanceSummary> {
        let mut summaries: Vec<InstanceSummary> = self
            .instances
            .iter()
            .map(|entry| InstanceSummary::from(entry.value()))
            .collect();
        summaries.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{InstanceMetrics, PowerState, RawInstance};

    fn observation(id: &str, util: Option<f64>) -> Observation {
        let raw = RawInstance {
            instance_id: id.to_owned(),
            instance_type: "t2.micro".to_owned(),
            state: PowerState::Running,
            private_ip: None,
            public_ip: None,
            availability_zone: None,
            tags: Vec::new(),
        };
        Observation::new(
            &raw,
            util.map(|cpu_utilization| InstanceMetrics {
                cpu_utilization,
                cpu_credit_balance: Some(100.0),
            }),
        )
    }

    #[test]
    fn test_apply_inserts_updates_and_removes() {
        let dir = InstanceDirectory::new();
        dir.apply(&[observation("i-1", Some(20.0)), observation("i-2", Some(40.0))]);
        assert_eq!(dir.len(), 2);

        dir.apply(&[observation("i-2", None)]);
        assert_eq!(dir.len(), 1);
        assert!(dir.get("i-1").is_none());
        assert_eq!(dir.get("i-2").unwrap().cpu_utilization, 40.0);
    }

    #[test]
    fn test_summaries_include_health() {
        let dir = InstanceDirectory::new();
        dir.apply(&[observation("i-1", Some(25.0))]);

        let summaries = dir.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].health, 0.75);

        let json = serde_json::to_value(&summaries).unwrap();
        assert_eq!(json[0]["instance_id"], "i-1");
        assert_eq!(json[0]["power_state"], "running");
    }

    #[test]
    fn test_clones_share_state() {
        let dir = InstanceDirectory::new();
        let view = dir.clone();
        dir.apply(&[observation("i-1", None)]);
        assert_eq!(view.len(), 1);
    }
}
