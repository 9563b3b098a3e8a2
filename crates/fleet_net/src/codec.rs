//! Little-endian frame codec.
//!
//! Encoding is typed: each [`FieldTag`] has exactly one payload shape, so
//! there is no way to hand the encoder a value it does not know how to write.
//! Non-finite floats are rejected before any byte of the record is written.

use fleet_component::Entity;
use fleet_math::{Quat, Vec3};
use tracing::trace;

use crate::error::NetError;
use crate::frame::{DecodedFrame, EntityRecord, FieldTag, FrameKind};

/// Largest entity ID that survives the round trip through `f32`.
pub const MAX_WIRE_ENTITY_ID: u32 = Entity::MAX.id();

/// Size of the frame header (the `f32` frame counter).
pub const HEADER_LEN: usize = 4;

/// Builds one websocket message: kind byte, frame counter, then records.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    kind: FrameKind,
    buf: Vec<u8>,
    records: usize,
}

impl FrameEncoder {
    /// Start a message of `kind` stamped with `frame_counter`.
    #[must_use]
    pub fn new(kind: FrameKind, frame_counter: u64) -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.push(kind.as_u8());
        buf.extend_from_slice(&(frame_counter as f32).to_le_bytes());
        Self {
            kind,
            buf,
            records: 0,
        }
    }

    /// The kind of message being built.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Append one entity record.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::NonFinite`] if any payload value is NaN or
    /// infinite, or [`NetError::EntityIdOutOfRange`] if the ID cannot be
    /// carried exactly. Nothing is written in either case.
    pub fn push(&mut self, record: &EntityRecord) -> Result<(), NetError> {
        validate(record)?;

        self.put_tag(FieldTag::EntityId);
        self.put_f32(record.entity.id() as f32);
        if let Some(p) = record.position {
            self.put_tag(FieldTag::Position);
            self.put_vec3(p);
        }
        if let Some(q) = record.orientation {
            self.put_tag(FieldTag::Orientation);
            self.put_f32(q.w);
            self.put_f32(q.x);
            self.put_f32(q.y);
            self.put_f32(q.z);
        }
        if let Some(m) = record.model {
            self.put_tag(FieldTag::ModelType);
            self.put_f32(f32::from(m));
        }
        if let Some(s) = record.scale {
            self.put_tag(FieldTag::Scale);
            self.put_vec3(s);
        }
        if let Some(h) = record.health {
            self.put_tag(FieldTag::Health);
            self.put_f32(h);
        }
        self.records += 1;
        Ok(())
    }

    /// Number of records pushed so far.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Returns `true` if no record has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Finish the message and return its bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        trace!(kind = ?self.kind, records = self.records, bytes = self.buf.len(), "frame encoded");
        self.buf
    }

    fn put_tag(&mut self, tag: FieldTag) {
        self.buf.push(tag.as_u8());
    }

    fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_vec3(&mut self, v: Vec3) {
        self.put_f32(v.x);
        self.put_f32(v.y);
        self.put_f32(v.z);
    }
}

fn validate(record: &EntityRecord) -> Result<(), NetError> {
    let id = record.entity.id();
    if id > MAX_WIRE_ENTITY_ID {
        return Err(NetError::EntityIdOutOfRange(id));
    }
    let non_finite = |tag| NetError::NonFinite { tag, entity: id };
    if record.position.is_some_and(|p| !p.is_finite()) {
        return Err(non_finite(FieldTag::Position));
    }
    if record.orientation.is_some_and(|q| !q.is_finite()) {
        return Err(non_finite(FieldTag::Orientation));
    }
    if record.scale.is_some_and(|s| !s.is_finite()) {
        return Err(non_finite(FieldTag::Scale));
    }
    if record.health.is_some_and(|h| !h.is_finite()) {
        return Err(non_finite(FieldTag::Health));
    }
    Ok(())
}

// ── Decoding ────────────────────────────────────────────────────────────────

/// Decode a websocket message: kind byte followed by a frame.
///
/// # Errors
///
/// Returns [`NetError::UnknownKind`] for an unknown kind byte, or any error
/// from [`decode_frame`].
pub fn decode_message(bytes: &[u8]) -> Result<(FrameKind, DecodedFrame), NetError> {
    let (&kind_byte, frame) = bytes.split_first().ok_or(NetError::Truncated {
        offset: 0,
        needed: 1,
        available: 0,
    })?;
    let kind = FrameKind::from_u8(kind_byte).ok_or(NetError::UnknownKind(kind_byte))?;
    Ok((kind, decode_frame(frame)?))
}

/// Decode a frame: `f32` counter then tagged fields until end of buffer.
///
/// Unknown tag bytes are skipped one byte at a time without consuming any
/// payload, matching the browser client's tolerance rule.
///
/// # Errors
///
/// Returns [`NetError::Truncated`] if the header or a field payload is cut
/// short, [`NetError::OrphanField`] if a field precedes any entity ID, and
/// [`NetError::InvalidEntityId`] for a non-integral or negative ID.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame, NetError> {
    let mut reader = Reader { bytes, offset: 0 };
    let frame = reader.f32s::<1>()?[0];
    let mut records: Vec<EntityRecord> = Vec::new();
    let mut skipped_tags = 0;

    while let Some(tag_byte) = reader.next_byte() {
        let Some(tag) = FieldTag::from_u8(tag_byte) else {
            trace!(tag = tag_byte, offset = reader.offset - 1, "skipping unknown tag");
            skipped_tags += 1;
            continue;
        };

        if tag == FieldTag::EntityId {
            let raw = reader.f32s::<1>()?[0];
            records.push(EntityRecord::id_only(entity_from_wire(raw)?));
            continue;
        }

        let record = records.last_mut().ok_or(NetError::OrphanField(tag))?;
        match tag {
            FieldTag::Position => {
                let [x, y, z] = reader.f32s::<3>()?;
                record.position = Some(Vec3::new(x, y, z));
            }
            FieldTag::Orientation => {
                let [r, i, j, k] = reader.f32s::<4>()?;
                record.orientation = Some(Quat::from_xyzw(i, j, k, r));
            }
            FieldTag::ModelType => {
                let [m] = reader.f32s::<1>()?;
                record.model = Some(m as u8);
            }
            FieldTag::Scale => {
                let [x, y, z] = reader.f32s::<3>()?;
                record.scale = Some(Vec3::new(x, y, z));
            }
            FieldTag::Health => {
                let [h] = reader.f32s::<1>()?;
                record.health = Some(h);
            }
            FieldTag::EntityId => unreachable!("handled above"),
        }
    }

    Ok(DecodedFrame {
        frame,
        records,
        skipped_tags,
    })
}

fn entity_from_wire(raw: f32) -> Result<Entity, NetError> {
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 || raw > MAX_WIRE_ENTITY_ID as f32 {
        return Err(NetError::InvalidEntityId(raw));
    }
    Ok(Entity::from_raw(raw as u32))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn next_byte(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.offset)?;
        self.offset += 1;
        Some(b)
    }

    fn f32s<const N: usize>(&mut self) -> Result<[f32; N], NetError> {
        let needed = N * 4;
        let available = self.bytes.len() - self.offset;
        if available < needed {
            return Err(NetError::Truncated {
                offset: self.offset,
                needed,
                available,
            });
        }
        let mut out = [0.0; N];
        for (slot, chunk) in out
            .iter_mut()
            .zip(self.bytes[self.offset..self.offset + needed].chunks_exact(4))
        {
            *slot = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        self.offset += needed;
        Ok(out)
    }
}
