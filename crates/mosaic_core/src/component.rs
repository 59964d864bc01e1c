//! # Component Storage
//!
//! Named, numerically-identified value tables indexed by entity, with
//! dirty tracking and a binary codec boundary.
//!
//! ## Design
//!
//! - A [`Codec`] turns values into bytes and back; storage never
//!   interprets payload bytes itself
//! - Dirty tracking is conservative: any mutable access marks the entity
//!   dirty, whether or not the caller actually wrote
//! - The dirty list keeps first-marking order so a tick drains changes
//!   in a stable sequence
//! - [`ComponentStore`] is the object-safe view the synchronization
//!   layer drives without knowing value types

use crate::buffer::ByteBuffer;
use crate::entity::EntityId;
use crate::error::ComponentError;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Numeric identifier of a component, unique per engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binary codec for one component's value type.
///
/// Encoding writes at the buffer's write cursor; decoding reads at the
/// read cursor and reports malformed payloads instead of panicking.
pub trait Codec: 'static {
    /// The value type this codec serializes.
    type Value: Clone + 'static;

    /// Appends `value` to the buffer.
    fn encode(&self, value: &Self::Value, buf: &mut ByteBuffer);

    /// Decodes one value from the buffer.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Decode`] when the payload is malformed.
    fn decode(&self, buf: &mut ByteBuffer) -> Result<Self::Value, ComponentError>;
}

/// Codec for plain-old-data values: the value's bytes verbatim.
///
/// Field order and width are fixed by the `#[repr(C)]` layout; byte
/// order is the platform's, which is little-endian on every supported
/// target.
#[derive(Clone, Copy, Debug)]
pub struct PodCodec<T> {
    component: ComponentId,
    _marker: std::marker::PhantomData<T>,
}

impl<T> PodCodec<T> {
    /// Creates a pod codec reporting decode failures against `component`.
    #[must_use]
    pub const fn new(component: ComponentId) -> Self {
        Self {
            component,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: bytemuck::Pod + 'static> Codec for PodCodec<T> {
    type Value = T;

    fn encode(&self, value: &T, buf: &mut ByteBuffer) {
        buf.write_bytes(bytemuck::bytes_of(value));
    }

    fn decode(&self, buf: &mut ByteBuffer) -> Result<T, ComponentError> {
        let size = std::mem::size_of::<T>();
        let bytes = buf
            .read_bytes(size)
            .ok_or_else(|| ComponentError::Decode {
                component: self.component,
                detail: format!("expected {size} bytes, buffer short"),
            })?;
        bytemuck::try_pod_read_unaligned(&bytes).map_err(|e| ComponentError::Decode {
            component: self.component,
            detail: e.to_string(),
        })
    }
}

/// Typed value table for one component.
pub struct ComponentDefinition<C: Codec> {
    id: ComponentId,
    name: String,
    codec: C,
    values: HashMap<EntityId, C::Value>,
    /// Entities changed since the last clear, in first-marking order.
    dirty: Vec<EntityId>,
    dirty_set: HashSet<EntityId>,
}

impl<C: Codec> ComponentDefinition<C> {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(id: ComponentId, name: impl Into<String>, codec: C) -> Self {
        Self {
            id,
            name: name.into(),
            codec,
            values: HashMap::new(),
            dirty: Vec::new(),
            dirty_set: HashSet::new(),
        }
    }

    /// The component's numeric id.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// The component's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `entity` currently has a value.
    #[must_use]
    pub fn has(&self, entity: EntityId) -> bool {
        self.values.contains_key(&entity)
    }

    /// Read-only view of the value.
    ///
    /// # Errors
    ///
    /// [`ComponentError::NotFound`] when the entity has no value.
    pub fn get(&self, entity: EntityId) -> Result<&C::Value, ComponentError> {
        self.values.get(&entity).ok_or(ComponentError::NotFound {
            entity,
            component: self.id,
        })
    }

    /// Read-only view of the value, or `None`.
    #[must_use]
    pub fn get_or_none(&self, entity: EntityId) -> Option<&C::Value> {
        self.values.get(&entity)
    }

    /// Mutable view of the value. Marks the entity dirty even if the
    /// caller never writes.
    ///
    /// # Errors
    ///
    /// [`ComponentError::NotFound`] when the entity has no value.
    pub fn get_mutable(&mut self, entity: EntityId) -> Result<&mut C::Value, ComponentError> {
        let component = self.id;
        self.get_mutable_or_none(entity)
            .ok_or(ComponentError::NotFound {
                entity,
                component,
            })
    }

    /// Mutable view of the value, or `None`. Marks the entity dirty when
    /// a value exists.
    pub fn get_mutable_or_none(&mut self, entity: EntityId) -> Option<&mut C::Value> {
        if self.values.contains_key(&entity) {
            Self::mark(&mut self.dirty, &mut self.dirty_set, entity);
        }
        self.values.get_mut(&entity)
    }

    /// Creates the value for an entity that must not already have one.
    ///
    /// # Errors
    ///
    /// [`ComponentError::AlreadyExists`] when a value is present.
    pub fn create(&mut self, entity: EntityId, value: C::Value) -> Result<(), ComponentError> {
        match self.values.entry(entity) {
            Entry::Occupied(_) => Err(ComponentError::AlreadyExists {
                entity,
                component: self.id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Self::mark(&mut self.dirty, &mut self.dirty_set, entity);
                Ok(())
            }
        }
    }

    /// Creates or overwrites the value.
    pub fn create_or_replace(&mut self, entity: EntityId, value: C::Value) {
        self.values.insert(entity, value);
        Self::mark(&mut self.dirty, &mut self.dirty_set, entity);
    }

    /// Deletes the value, marking the entity dirty so the tombstone
    /// propagates. Returns whether a value existed.
    pub fn delete_from(&mut self, entity: EntityId) -> bool {
        if self.values.remove(&entity).is_some() {
            Self::mark(&mut self.dirty, &mut self.dirty_set, entity);
            true
        } else {
            false
        }
    }

    /// Serializes the current value into the buffer.
    ///
    /// # Errors
    ///
    /// [`ComponentError::NotFound`] when the entity has no value.
    pub fn write_to_buffer(
        &self,
        entity: EntityId,
        buf: &mut ByteBuffer,
    ) -> Result<(), ComponentError> {
        let value = self.get(entity)?;
        self.codec.encode(value, buf);
        Ok(())
    }

    /// Serializes the current value into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// [`ComponentError::NotFound`] when the entity has no value.
    pub fn to_binary(&self, entity: EntityId) -> Result<Vec<u8>, ComponentError> {
        let mut buf = ByteBuffer::new();
        self.write_to_buffer(entity, &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decodes a payload and installs it whether or not a value exists.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Decode`] when the payload is malformed.
    pub fn upsert_from_binary(
        &mut self,
        entity: EntityId,
        buf: &mut ByteBuffer,
    ) -> Result<(), ComponentError> {
        let value = self.codec.decode(buf)?;
        self.create_or_replace(entity, value);
        Ok(())
    }

    /// Decodes a payload and overwrites an existing value.
    ///
    /// # Errors
    ///
    /// [`ComponentError::NotFound`] when the entity has no value;
    /// [`ComponentError::Decode`] when the payload is malformed.
    pub fn update_from_binary(
        &mut self,
        entity: EntityId,
        buf: &mut ByteBuffer,
    ) -> Result<(), ComponentError> {
        if !self.values.contains_key(&entity) {
            return Err(ComponentError::NotFound {
                entity,
                component: self.id,
            });
        }
        self.upsert_from_binary(entity, buf)
    }

    /// Iterates entities changed since the last clear, in first-marking
    /// order.
    pub fn dirty_iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.dirty.iter().copied()
    }

    /// Clears all dirty marks. Called once per tick after the
    /// synchronization layer has drained the set.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
        self.dirty_set.clear();
    }

    /// Clears one entity's dirty mark. Used when a just-applied remote
    /// write must not be mistaken for a pending local change.
    pub fn clear_dirty_entity(&mut self, entity: EntityId) {
        if self.dirty_set.remove(&entity) {
            self.dirty.retain(|e| *e != entity);
        }
    }

    /// Iterates the entities that currently have a value.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.values.keys().copied()
    }

    fn mark(dirty: &mut Vec<EntityId>, dirty_set: &mut HashSet<EntityId>, entity: EntityId) {
        if dirty_set.insert(entity) {
            dirty.push(entity);
        }
    }
}

/// Object-safe view of a component table, driven by the synchronization
/// layer.
pub trait ComponentStore {
    /// The component's numeric id.
    fn component_id(&self) -> ComponentId;

    /// The component's name.
    fn store_name(&self) -> &str;

    /// Whether `entity` currently has a value.
    fn exists(&self, entity: EntityId) -> bool;

    /// Serializes the current value into the buffer.
    ///
    /// # Errors
    ///
    /// [`ComponentError::NotFound`] when the entity has no value.
    fn write_value(&self, entity: EntityId, buf: &mut ByteBuffer) -> Result<(), ComponentError>;

    /// Applies an accepted remote write: decode and install.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Decode`] when the payload is malformed.
    fn apply_put(&mut self, entity: EntityId, buf: &mut ByteBuffer) -> Result<(), ComponentError>;

    /// Applies an accepted remote tombstone. Returns whether a value
    /// existed.
    fn apply_delete(&mut self, entity: EntityId) -> bool;

    /// Drops the entity's value and dirty mark without generating a
    /// tombstone. Used when the whole entity is deleted.
    fn purge(&mut self, entity: EntityId);

    /// Snapshot of the dirty list in first-marking order.
    fn dirty_entities(&self) -> Vec<EntityId>;

    /// Clears all dirty marks.
    fn clear_dirty(&mut self);

    /// Clears one entity's dirty mark.
    fn clear_dirty_entity(&mut self, entity: EntityId);

    /// Snapshot of the entities that currently have a value.
    fn stored_entities(&self) -> Vec<EntityId>;

    /// Downcast support for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Codec> ComponentStore for ComponentDefinition<C> {
    fn component_id(&self) -> ComponentId {
        self.id()
    }

    fn store_name(&self) -> &str {
        self.name()
    }

    fn exists(&self, entity: EntityId) -> bool {
        self.has(entity)
    }

    fn write_value(&self, entity: EntityId, buf: &mut ByteBuffer) -> Result<(), ComponentError> {
        self.write_to_buffer(entity, buf)
    }

    fn apply_put(&mut self, entity: EntityId, buf: &mut ByteBuffer) -> Result<(), ComponentError> {
        self.upsert_from_binary(entity, buf)
    }

    fn apply_delete(&mut self, entity: EntityId) -> bool {
        self.delete_from(entity)
    }

    fn purge(&mut self, entity: EntityId) {
        self.values.remove(&entity);
        self.clear_dirty_entity(entity);
    }

    fn dirty_entities(&self) -> Vec<EntityId> {
        self.dirty.clone()
    }

    fn clear_dirty(&mut self) {
        ComponentDefinition::clear_dirty(self);
    }

    fn clear_dirty_entity(&mut self, entity: EntityId) {
        ComponentDefinition::clear_dirty_entity(self, entity);
    }

    fn stored_entities(&self) -> Vec<EntityId> {
        self.entities().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Health {
        current: u32,
        max: u32,
    }

    fn definition() -> ComponentDefinition<PodCodec<Health>> {
        let id = ComponentId(1);
        ComponentDefinition::new(id, "health", PodCodec::new(id))
    }

    fn entity(n: u16) -> EntityId {
        EntityId::new(n, 0)
    }

    #[test]
    fn test_create_marks_dirty_and_rejects_duplicates() {
        let mut def = definition();
        def.create(entity(600), Health { current: 10, max: 10 }).unwrap();
        assert_eq!(def.dirty_iter().collect::<Vec<_>>(), vec![entity(600)]);
        assert!(matches!(
            def.create(entity(600), Health::default()),
            Err(ComponentError::AlreadyExists { .. })
        ));
        def.create_or_replace(entity(600), Health { current: 5, max: 10 });
        assert_eq!(def.get(entity(600)).unwrap().current, 5);
    }

    #[test]
    fn test_get_mutable_is_conservatively_dirty() {
        let mut def = definition();
        def.create(entity(600), Health::default()).unwrap();
        def.clear_dirty();

        // No write happens, the mark is still set.
        let _ = def.get_mutable(entity(600)).unwrap();
        assert_eq!(def.dirty_iter().count(), 1);

        assert!(matches!(
            def.get_mutable(entity(601)),
            Err(ComponentError::NotFound { .. })
        ));
        assert!(def.get_mutable_or_none(entity(601)).is_none());
    }

    #[test]
    fn test_delete_marks_dirty_only_when_present() {
        let mut def = definition();
        def.create(entity(600), Health::default()).unwrap();
        def.clear_dirty();

        assert!(def.delete_from(entity(600)));
        assert_eq!(def.dirty_iter().collect::<Vec<_>>(), vec![entity(600)]);

        def.clear_dirty();
        assert!(!def.delete_from(entity(600)));
        assert_eq!(def.dirty_iter().count(), 0);
    }

    #[test]
    fn test_binary_round_trip() {
        let mut def = definition();
        let value = Health { current: 7, max: 12 };
        def.create(entity(600), value).unwrap();

        let bytes = def.to_binary(entity(600)).unwrap();
        let mut incoming = ByteBuffer::from_bytes(&bytes);
        def.upsert_from_binary(entity(601), &mut incoming).unwrap();
        assert_eq!(def.get(entity(601)).unwrap(), &value);
    }

    #[test]
    fn test_update_from_binary_requires_presence() {
        let mut def = definition();
        let mut buf = ByteBuffer::new();
        def.codec.encode(&Health::default(), &mut buf);
        assert!(matches!(
            def.update_from_binary(entity(600), &mut buf),
            Err(ComponentError::NotFound { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let mut def = definition();
        let mut buf = ByteBuffer::from_bytes(&[1, 2, 3]);
        assert!(matches!(
            def.upsert_from_binary(entity(600), &mut buf),
            Err(ComponentError::Decode { .. })
        ));
    }

    #[test]
    fn test_dirty_order_and_targeted_clear() {
        let mut def = definition();
        def.create(entity(700), Health::default()).unwrap();
        def.create(entity(701), Health::default()).unwrap();
        def.create(entity(702), Health::default()).unwrap();

        def.clear_dirty_entity(entity(701));
        assert_eq!(
            def.dirty_iter().collect::<Vec<_>>(),
            vec![entity(700), entity(702)]
        );

        def.clear_dirty();
        assert_eq!(def.dirty_iter().count(), 0);
    }

    #[test]
    fn test_purge_leaves_no_trace() {
        let mut def = definition();
        def.create(entity(700), Health::default()).unwrap();
        ComponentStore::purge(&mut def, entity(700));
        assert!(!def.has(entity(700)));
        assert_eq!(def.dirty_iter().count(), 0);
    }
}
