//! # Component Operations
//!
//! Encoders and the decoder for the three replicated operations:
//! component writes, component tombstones, and whole-entity removals.
//!
//! ## Design
//!
//! - Writers reserve the header slots first, stream the body, then
//!   backfill lengths by absolute offset - the payload's size is not
//!   known until the component codec has run
//! - The decoder consumes exactly one frame per call and always lands
//!   the cursor on the next frame boundary, even when a peer padded the
//!   body beyond the fields it needed

use super::framing::{self, WireHeader};
use super::MessageKind;
use crate::error::ProtocolError;
use mosaic_core::{ByteBuffer, ComponentError, ComponentId, ComponentStore, EntityId};

/// Fixed body prefix of a component operation: entity, component id,
/// timestamp.
const COMPONENT_OP_FIXED: usize = 4 + 4 + 8;

/// Smallest valid PUT frame: header, fixed prefix, payload length.
const PUT_MIN_LENGTH: usize = WireHeader::SIZE + COMPONENT_OP_FIXED + 4;

/// Exact DELETE_COMPONENT frame length: header and fixed prefix only.
const DELETE_LENGTH: usize = WireHeader::SIZE + COMPONENT_OP_FIXED;

/// Smallest valid DELETE_ENTITY frame: header and entity id.
const DELETE_ENTITY_MIN_LENGTH: usize = WireHeader::SIZE + 4;

/// One decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrdtMessage {
    /// A component value write.
    PutComponent {
        /// Target entity.
        entity: EntityId,
        /// Target component.
        component: ComponentId,
        /// The writer's logical timestamp for this key.
        timestamp: u64,
        /// Codec-opaque payload bytes.
        data: Vec<u8>,
    },
    /// A component tombstone.
    DeleteComponent {
        /// Target entity.
        entity: EntityId,
        /// Target component.
        component: ComponentId,
        /// The writer's logical timestamp for this key.
        timestamp: u64,
    },
    /// A whole-entity removal notification.
    DeleteEntity {
        /// The removed entity.
        entity: EntityId,
    },
}

impl CrdtMessage {
    /// The entity this message targets.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::PutComponent { entity, .. }
            | Self::DeleteComponent { entity, .. }
            | Self::DeleteEntity { entity } => *entity,
        }
    }

    /// The wire kind of this message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::PutComponent { .. } => MessageKind::PutComponent,
            Self::DeleteComponent { .. } => MessageKind::DeleteComponent,
            Self::DeleteEntity { .. } => MessageKind::DeleteEntity,
        }
    }
}

/// Whether the next operation for `(store, entity)` is a write or a
/// tombstone, derived from current existence rather than per-edit
/// bookkeeping.
#[must_use]
pub fn operation_kind(store: &dyn ComponentStore, entity: EntityId) -> MessageKind {
    if store.exists(entity) {
        MessageKind::PutComponent
    } else {
        MessageKind::DeleteComponent
    }
}

/// Encodes a PUT frame, streaming the payload straight from the store's
/// codec.
///
/// # Errors
///
/// [`ComponentError::NotFound`] when the entity has no value to encode.
pub fn write_put(
    entity: EntityId,
    component: ComponentId,
    timestamp: u64,
    store: &dyn ComponentStore,
    buf: &mut ByteBuffer,
) -> Result<(), ComponentError> {
    let frame_start = buf.increment_write_offset(4);
    buf.write_u32(MessageKind::PutComponent.as_u32());
    buf.write_u32(entity.raw());
    buf.write_i32(component.0 as i32);
    buf.write_u64(timestamp);
    let payload_len_slot = buf.increment_write_offset(4);
    let payload_start = buf.write_offset();

    store.write_value(entity, buf)?;

    buf.set_u32(payload_len_slot, (buf.write_offset() - payload_start) as u32);
    buf.set_u32(frame_start, (buf.write_offset() - frame_start) as u32);
    Ok(())
}

/// Encodes a PUT frame from already-serialized payload bytes. Used when
/// re-broadcasting an authoritative value held by the register.
pub fn write_put_raw(
    entity: EntityId,
    component: ComponentId,
    timestamp: u64,
    payload: &[u8],
    buf: &mut ByteBuffer,
) {
    let frame_start = buf.increment_write_offset(4);
    buf.write_u32(MessageKind::PutComponent.as_u32());
    buf.write_u32(entity.raw());
    buf.write_i32(component.0 as i32);
    buf.write_u64(timestamp);
    buf.write_buffer(payload, true);
    buf.set_u32(frame_start, (buf.write_offset() - frame_start) as u32);
}

/// Encodes a DELETE_COMPONENT frame. Tombstones carry no payload bytes.
pub fn write_delete(
    entity: EntityId,
    component: ComponentId,
    timestamp: u64,
    buf: &mut ByteBuffer,
) {
    let frame_start = buf.increment_write_offset(4);
    buf.write_u32(MessageKind::DeleteComponent.as_u32());
    buf.write_u32(entity.raw());
    buf.write_i32(component.0 as i32);
    buf.write_u64(timestamp);
    buf.set_u32(frame_start, (buf.write_offset() - frame_start) as u32);
}

/// Encodes a DELETE_ENTITY frame.
pub fn write_delete_entity(entity: EntityId, buf: &mut ByteBuffer) {
    let frame_start = buf.increment_write_offset(4);
    buf.write_u32(MessageKind::DeleteEntity.as_u32());
    buf.write_u32(entity.raw());
    buf.set_u32(frame_start, (buf.write_offset() - frame_start) as u32);
}

/// Decodes one frame at the read cursor.
///
/// `Ok(None)` when no complete frame remains (wait for more bytes). On
/// success the cursor lands exactly on the next frame boundary.
///
/// # Errors
///
/// [`ProtocolError::UnknownMessageKind`] when a complete frame carries
/// an unrecognized or reserved kind;
/// [`ProtocolError::MalformedBody`] when the declared length cannot hold
/// the kind's fixed fields.
pub fn read(buf: &mut ByteBuffer) -> Result<Option<CrdtMessage>, ProtocolError> {
    let frame_start = buf.read_offset();
    let Some(header) = framing::read_header(buf) else {
        return Ok(None);
    };
    let frame_end = frame_start + header.length as usize;
    let malformed = ProtocolError::MalformedBody {
        kind: header.kind,
        declared: header.length,
    };

    let message = match MessageKind::from_u32(header.kind) {
        Some(MessageKind::PutComponent) => {
            if (header.length as usize) < PUT_MIN_LENGTH {
                return Err(malformed);
            }
            let (entity, component, timestamp) = read_fixed(buf).ok_or_else(|| malformed.clone())?;
            let payload_len = buf.read_u32().ok_or_else(|| malformed.clone())? as usize;
            if buf.read_offset() + payload_len > frame_end {
                return Err(malformed);
            }
            let data = buf.read_bytes(payload_len).ok_or(malformed)?;
            CrdtMessage::PutComponent {
                entity,
                component,
                timestamp,
                data,
            }
        }
        Some(MessageKind::DeleteComponent) => {
            if (header.length as usize) < DELETE_LENGTH {
                return Err(malformed);
            }
            let (entity, component, timestamp) = read_fixed(buf).ok_or(malformed)?;
            CrdtMessage::DeleteComponent {
                entity,
                component,
                timestamp,
            }
        }
        Some(MessageKind::DeleteEntity) => {
            if (header.length as usize) < DELETE_ENTITY_MIN_LENGTH {
                return Err(malformed);
            }
            let entity = buf.read_u32().map(EntityId::from_raw).ok_or(malformed)?;
            CrdtMessage::DeleteEntity { entity }
        }
        Some(MessageKind::Reserved) | None => {
            return Err(ProtocolError::UnknownMessageKind {
                kind: header.kind,
                offset: frame_start,
            });
        }
    };

    // Land on the next frame even if this one padded its body.
    buf.increment_read_offset(frame_end.saturating_sub(buf.read_offset()));
    Ok(Some(message))
}

/// Reads the fixed component-operation prefix.
fn read_fixed(buf: &mut ByteBuffer) -> Option<(EntityId, ComponentId, u64)> {
    let entity = EntityId::from_raw(buf.read_u32()?);
    let component = ComponentId(buf.read_i32()? as u32);
    let timestamp = buf.read_u64()?;
    Some((entity, component, timestamp))
}
