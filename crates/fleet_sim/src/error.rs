//! Simulation error types.

use fleet_component::{ComponentError, Entity};

/// Errors raised by world mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The entity was never spawned or has been deleted.
    #[error("{0} is not alive")]
    UnknownEntity(Entity),

    /// Every entity ID the wire format can carry has been used.
    #[error("entity id space exhausted")]
    EntitiesExhausted,

    /// A component that must exist is missing.
    #[error(transparent)]
    Component(#[from] ComponentError),
}
