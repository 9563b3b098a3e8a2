//! # fleet_component
//!
//! The "E" and "C" of the fleet world: what an entity is, what a component is,
//! and how components of one kind are stored.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u32` entity identifiers.
//! - [`EntityAllocator`] — monotonically increasing ID allocator. IDs are never
//!   reused within a process.
//! - [`Component`] trait — the contract all per-entity data must satisfy.
//! - [`ComponentTable`] — insertion-ordered storage for one component kind.

pub mod component;
pub mod entity;
pub mod table;

pub use component::{Component, ComponentError};
pub use entity::{Entity, EntityAllocator};
pub use table::ComponentTable;
