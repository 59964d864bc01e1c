//! # MOSAIC Core
//!
//! Replica-local scene state for the MOSAIC runtime:
//! - Entity ids with version-based recycling and a grow-only removal log
//! - Per-component value tables behind a binary codec boundary, with
//!   conservative dirty tracking
//! - The byte buffer every serializer in the workspace writes through
//!
//! ## Architecture Rules
//!
//! 1. **No wire knowledge** - framing and conflict resolution live in
//!    `mosaic_sync`; this crate only stores and diffs state
//! 2. **Single writer** - everything here assumes the tick loop is the
//!    only caller; there is no interior locking
//! 3. **Codecs are opaque** - payload bytes are never interpreted past
//!    the [`Codec`] boundary
//!
//! ## Example
//!
//! ```rust,ignore
//! use mosaic_core::{ComponentId, PodCodec, World};
//!
//! let mut world = World::new();
//! world.define_component(ComponentId(1), "transform", codec)?;
//! let entity = world.spawn(false)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buffer;
pub mod component;
pub mod container;
pub mod entity;
pub mod error;
pub mod world;

pub use buffer::ByteBuffer;
pub use component::{Codec, ComponentDefinition, ComponentId, ComponentStore, PodCodec};
pub use container::EntityContainer;
pub use entity::{
    EntityId, EntityState, NetworkRange, MAX_ENTITY_NUMBER, MAX_ENTITY_VERSION, RESERVED_ENTITIES,
};
pub use error::{ComponentError, EntityError};
pub use world::World;
