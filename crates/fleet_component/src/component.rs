//! Core [`Component`] trait and component-level errors.
//!
//! Every piece of per-entity data stored in the world must implement
//! [`Component`]. The trait requires `Send + Sync + 'static` so the world can
//! move between the simulation task and its setup code freely.

use crate::entity::Entity;

/// The core component trait.
///
/// Components are plain data. The only thing the store needs to know about a
/// kind is a human-readable name, used in logs and error messages.
///
/// # Examples
///
/// ```rust
/// use fleet_component::Component;
///
/// #[derive(Debug, Clone)]
/// struct Health {
///     current: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// A human-readable name for this component kind.
    fn type_name() -> &'static str;
}

/// Errors raised by component lookups that are required to succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    /// The entity has no component of the requested kind.
    #[error("{entity} has no {component} component")]
    Missing {
        /// The entity that was looked up.
        entity: Entity,
        /// The component kind's name.
        component: &'static str,
    },
}

impl ComponentError {
    /// Build a [`ComponentError::Missing`] for component kind `T`.
    #[must_use]
    pub fn missing<T: Component>(entity: Entity) -> Self {
        Self::Missing {
            entity,
            component: T::type_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Health;

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[test]
    fn test_missing_error_names_component() {
        let err = ComponentError::missing::<Health>(Entity::from_raw(7));
        assert_eq!(err.to_string(), "Entity(7) has no Health component");
    }
}
