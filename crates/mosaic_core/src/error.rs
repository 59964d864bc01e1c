//! # Core Error Types
//!
//! All errors that can occur in entity allocation and component storage.

use crate::component::ComponentId;
use crate::entity::EntityId;
use thiserror::Error;

/// Errors raised by the entity allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// The static bump counter passed the last allocatable number.
    #[error("static entity numbers exhausted at {limit}")]
    StaticRangeExhausted {
        /// The highest allocatable number.
        limit: u16,
    },

    /// A networked allocation was requested before the host assigned a
    /// range to this peer.
    #[error("networked entity range has not been configured")]
    NetworkRangeNotConfigured,

    /// The configured networked band has no numbers left.
    #[error("networked entity range [{from}, {to}] exhausted")]
    NetworkRangeExhausted {
        /// First number of the band.
        from: u16,
        /// Last number of the band.
        to: u16,
    },

    /// The networked band is empty, reversed, or reaches into the
    /// reserved or already-consumed static region.
    #[error("invalid networked entity range [{from}, {to}]")]
    InvalidNetworkRange {
        /// First number of the band.
        from: u16,
        /// Last number of the band.
        to: u16,
    },
}

/// Errors raised by component definitions and the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// A component id was registered twice.
    #[error("component id {0} is already defined")]
    DuplicateComponentId(ComponentId),

    /// No component is registered under this id.
    #[error("component id {0} is not defined")]
    UnknownComponentId(ComponentId),

    /// The registered component under this id has a different value type.
    #[error("component id {0} is defined with a different value type")]
    WrongComponentType(ComponentId),

    /// `create` was called for an entity that already has a value.
    #[error("entity {entity} already has component {component}")]
    AlreadyExists {
        /// The entity.
        entity: EntityId,
        /// The component.
        component: ComponentId,
    },

    /// The entity has no value for this component.
    #[error("entity {entity} has no component {component}")]
    NotFound {
        /// The entity.
        entity: EntityId,
        /// The component.
        component: ComponentId,
    },

    /// The component codec rejected a payload.
    #[error("component {component} payload decode failed: {detail}")]
    Decode {
        /// The component whose codec failed.
        component: ComponentId,
        /// What the codec reported.
        detail: String,
    },
}
