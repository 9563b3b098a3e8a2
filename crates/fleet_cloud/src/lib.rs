//! # fleet_cloud
//!
//! The slow side of the visualiser: what the cloud says the fleet looks like.
//!
//! This crate provides:
//!
//! - [`provider`] — the [`CloudProvider`] contract plus file-backed and mock
//!   implementations.
//! - [`instance`] — raw inventory records and their projection,
//!   [`FleetInstance`].
//! - [`pricing`] — hourly cost per instance class and the size derived from it.
//! - [`reconciler`] — the periodic poll that turns inventory and metrics into
//!   [`FleetSnapshot`]s for the simulation.
//! - [`directory`] — a concurrently readable view of the latest instances.
//! - [`error`] — provider error types.

pub mod directory;
pub mod error;
pub mod instance;
pub mod pricing;
pub mod provider;
pub mod reconciler;

pub use directory::{InstanceDirectory, InstanceSummary};
pub use error::CloudError;
pub use instance::{
    FleetInstance, InstanceMetrics, Observation, PowerState, RawInstance, Tag, Telemetry,
};
pub use provider::{CloudProvider, FileProvider, MockProvider};
pub use reconciler::{FleetSnapshot, Reconciler, ReconcilerConfig};
