//! Frame kinds, field tags, and per-entity records.
//!
//! The tag values and payload sizes are part of the browser protocol and must
//! not change.

use fleet_component::Entity;
use fleet_math::{Quat, Vec3};

// ── Frame kinds ─────────────────────────────────────────────────────────────

/// The kind byte that prefixes every websocket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Full state of every live entity, sent once when a client connects.
    Snapshot = 1,
    /// Entities that moved or that the client has not seen yet.
    Delta = 2,
    /// IDs of entities deleted since the previous tick.
    Dead = 3,
}

impl FrameKind {
    /// The byte written on the wire.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a kind byte.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Snapshot),
            2 => Some(Self::Delta),
            3 => Some(Self::Dead),
            _ => None,
        }
    }
}

// ── Field tags ──────────────────────────────────────────────────────────────

/// A field tag. Every field is one tag byte followed by a fixed-size payload
/// of little-endian `f32`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FieldTag {
    /// Entity ID cast to `f32`. Starts a record.
    EntityId = 1,
    /// Position `(x, y, z)`.
    Position = 2,
    /// Orientation `(r, i, j, k)`.
    Orientation = 3,
    /// Model kind cast to `f32`.
    ModelType = 4,
    /// Scale `(x, y, z)`.
    Scale = 5,
    /// Health in `[0, 1]`.
    Health = 6,
}

impl FieldTag {
    /// Every tag, in record order.
    pub const ALL: [FieldTag; 6] = [
        Self::EntityId,
        Self::Position,
        Self::Orientation,
        Self::ModelType,
        Self::Scale,
        Self::Health,
    ];

    /// The byte written on the wire.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a tag byte. Unknown tags yield `None`.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::EntityId),
            2 => Some(Self::Position),
            3 => Some(Self::Orientation),
            4 => Some(Self::ModelType),
            5 => Some(Self::Scale),
            6 => Some(Self::Health),
            _ => None,
        }
    }

    /// Number of `f32`s in this field's payload.
    #[must_use]
    pub const fn float_count(self) -> usize {
        match self {
            Self::EntityId | Self::ModelType | Self::Health => 1,
            Self::Position | Self::Scale => 3,
            Self::Orientation => 4,
        }
    }

    /// Payload length in bytes, excluding the tag byte.
    #[must_use]
    pub const fn payload_len(self) -> usize {
        self.float_count() * 4
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// Everything one frame says about one entity.
///
/// Only the entity ID is mandatory; the optional fields are written in
/// [`FieldTag`] order when present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    /// The entity this record describes.
    pub entity: Entity,
    /// World-space position.
    pub position: Option<Vec3>,
    /// Orientation.
    pub orientation: Option<Quat>,
    /// Model kind code.
    pub model: Option<u8>,
    /// Scale.
    pub scale: Option<Vec3>,
    /// Health in `[0, 1]`.
    pub health: Option<f32>,
}

impl EntityRecord {
    /// A record carrying only the entity ID, as used in dead frames.
    #[must_use]
    pub const fn id_only(entity: Entity) -> Self {
        Self {
            entity,
            position: None,
            orientation: None,
            model: None,
            scale: None,
            health: None,
        }
    }

    /// Set the position.
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the orientation.
    #[must_use]
    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = Some(orientation);
        self
    }

    /// Set the model kind code.
    #[must_use]
    pub fn with_model(mut self, model: u8) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Set the health.
    #[must_use]
    pub fn with_health(mut self, health: f32) -> Self {
        self.health = Some(health);
        self
    }
}

/// A decoded frame: the counter from the header and the records that followed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// The frame counter as carried on the wire.
    pub frame: f32,
    /// Records in wire order.
    pub records: Vec<EntityRecord>,
    /// Number of unknown tag bytes that were skipped.
    pub skipped_tags: usize,
}
