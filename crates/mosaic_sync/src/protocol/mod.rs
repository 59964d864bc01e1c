//! # Wire Protocol
//!
//! Every message on the wire is a self-describing frame: an 8-byte
//! header (total length, kind) followed by kind-specific fields.
//!
//! ## Frame layout (little-endian)
//!
//! ```text
//! frame            := length:u32 | kind:u32 | body
//! PUT_COMPONENT    := entity:u32 | component:i32 | timestamp:u64 | payload_len:u32 | payload
//! DELETE_COMPONENT := entity:u32 | component:i32 | timestamp:u64
//! DELETE_ENTITY    := entity:u32
//! ```
//!
//! `length` counts the entire frame, header included: the next frame
//! starts exactly `length` bytes after this one begins. DELETE frames
//! carry no payload bytes at all; the reader decides interpretation from
//! `kind` alone.

pub mod framing;
pub mod operations;

pub use framing::WireHeader;
pub use operations::CrdtMessage;

/// Kind discriminant of a wire frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Unused; kept so the zero value never decodes as a real message.
    Reserved = 0,
    /// A component value write.
    PutComponent = 1,
    /// A component tombstone.
    DeleteComponent = 2,
    /// A whole-entity removal notification.
    DeleteEntity = 3,
}

impl MessageKind {
    /// Decodes a raw kind field. `None` for unrecognized values.
    #[must_use]
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Reserved),
            1 => Some(Self::PutComponent),
            2 => Some(Self::DeleteComponent),
            3 => Some(Self::DeleteEntity),
            _ => None,
        }
    }

    /// The raw kind field for this message kind.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}
