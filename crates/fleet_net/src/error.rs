//! Codec error types.

use crate::frame::FieldTag;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetError {
    /// A payload value was NaN or infinite. Clients cannot render these, so
    /// they never reach the wire.
    #[error("non-finite value in {tag:?} field of entity {entity}")]
    NonFinite {
        /// The field carrying the bad value.
        tag: FieldTag,
        /// The raw entity ID of the record.
        entity: u32,
    },

    /// An entity ID cannot be represented exactly as an `f32`.
    #[error("entity id {0} is not exactly representable on the wire")]
    EntityIdOutOfRange(u32),

    /// The buffer ended in the middle of a header or field payload.
    #[error("frame truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Byte offset where the read started.
        offset: usize,
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A field other than ENTITY_ID appeared before any ENTITY_ID.
    #[error("{0:?} field appeared before any entity id")]
    OrphanField(FieldTag),

    /// The decoded ENTITY_ID was not a non-negative integer.
    #[error("invalid entity id on the wire: {0}")]
    InvalidEntityId(f32),

    /// The message envelope carried an unknown frame kind.
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
}
