//! # fleet_net
//!
//! Wire format for the browser stream.
//!
//! This crate provides:
//!
//! - [`frame`] — frame kinds, field tags, and the per-entity [`EntityRecord`].
//! - [`codec`] — the little-endian frame encoder and decoder.
//! - [`error`] — codec error types.
//!
//! A websocket message is one byte of [`FrameKind`] followed by a frame: a
//! little-endian `f32` frame counter and a run of tagged fields until the end
//! of the buffer.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{FrameEncoder, decode_frame, decode_message};
pub use error::NetError;
pub use frame::{DecodedFrame, EntityRecord, FieldTag, FrameKind};
