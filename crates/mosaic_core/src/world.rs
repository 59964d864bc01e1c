//! # World
//!
//! The replica-local scene state: an entity container plus one store per
//! registered component.
//!
//! The world knows nothing about wire formats or peers; the
//! synchronization layer drives it through the [`ComponentStore`] view.

use crate::component::{Codec, ComponentDefinition, ComponentId, ComponentStore};
use crate::container::EntityContainer;
use crate::entity::EntityId;
use crate::error::{ComponentError, EntityError};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Entity container plus component stores.
#[derive(Default)]
pub struct World {
    entities: EntityContainer,
    stores: HashMap<ComponentId, Box<dyn ComponentStore>>,
    /// Registration order, for deterministic iteration.
    order: Vec<ComponentId>,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: EntityContainer::new(),
            stores: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Allocates an entity.
    ///
    /// # Errors
    ///
    /// See [`EntityContainer::generate`].
    pub fn spawn(&mut self, networked: bool) -> Result<EntityId, EntityError> {
        self.entities.generate(networked)
    }

    /// Removes an entity (deferred until end of tick). Returns `false`
    /// for reserved ids.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        self.entities.remove(entity)
    }

    /// The entity container.
    #[must_use]
    pub fn entities(&self) -> &EntityContainer {
        &self.entities
    }

    /// The entity container, mutably.
    pub fn entities_mut(&mut self) -> &mut EntityContainer {
        &mut self.entities
    }

    /// Registers a component.
    ///
    /// # Errors
    ///
    /// [`ComponentError::DuplicateComponentId`] when the id is taken.
    pub fn define_component<C: Codec>(
        &mut self,
        id: ComponentId,
        name: impl Into<String>,
        codec: C,
    ) -> Result<(), ComponentError> {
        match self.stores.entry(id) {
            Entry::Occupied(_) => Err(ComponentError::DuplicateComponentId(id)),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(ComponentDefinition::new(id, name, codec)));
                self.order.push(id);
                Ok(())
            }
        }
    }

    /// Typed view of a registered component.
    ///
    /// # Errors
    ///
    /// [`ComponentError::UnknownComponentId`] when nothing is registered
    /// under `id`; [`ComponentError::WrongComponentType`] when the
    /// registered store serializes a different value type.
    pub fn component<C: Codec>(
        &self,
        id: ComponentId,
    ) -> Result<&ComponentDefinition<C>, ComponentError> {
        let store = self
            .stores
            .get(&id)
            .ok_or(ComponentError::UnknownComponentId(id))?;
        store
            .as_any()
            .downcast_ref()
            .ok_or(ComponentError::WrongComponentType(id))
    }

    /// Typed mutable view of a registered component.
    ///
    /// # Errors
    ///
    /// Same as [`component`](Self::component).
    pub fn component_mut<C: Codec>(
        &mut self,
        id: ComponentId,
    ) -> Result<&mut ComponentDefinition<C>, ComponentError> {
        let store = self
            .stores
            .get_mut(&id)
            .ok_or(ComponentError::UnknownComponentId(id))?;
        store
            .as_any_mut()
            .downcast_mut()
            .ok_or(ComponentError::WrongComponentType(id))
    }

    /// Type-erased view of a registered component.
    #[must_use]
    pub fn store(&self, id: ComponentId) -> Option<&dyn ComponentStore> {
        self.stores.get(&id).map(|store| &**store)
    }

    /// Type-erased mutable view of a registered component.
    pub fn store_mut(&mut self, id: ComponentId) -> Option<&mut (dyn ComponentStore + 'static)> {
        self.stores.get_mut(&id).map(|store| &mut **store)
    }

    /// Registered component ids in registration order.
    #[must_use]
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.order.clone()
    }

    /// Iterates every store mutably, in registration order.
    pub fn for_each_store_mut(&mut self, mut f: impl FnMut(&mut dyn ComponentStore)) {
        for id in &self.order {
            if let Some(store) = self.stores.get_mut(id) {
                f(&mut **store);
            }
        }
    }

    /// Entities that currently hold a value for every listed component.
    #[must_use]
    pub fn entities_with(&self, components: &[ComponentId]) -> Vec<EntityId> {
        let Some((first, rest)) = components.split_first() else {
            return Vec::new();
        };
        let Some(base) = self.stores.get(first) else {
            return Vec::new();
        };
        let mut result = base.stored_entities();
        result.sort_unstable();
        for id in rest {
            let Some(store) = self.stores.get(id) else {
                return Vec::new();
            };
            result.retain(|entity| store.exists(*entity));
        }
        result
    }
}
