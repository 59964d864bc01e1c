//! # Entity Identity
//!
//! Entities are lightweight 32-bit identifiers consisting of:
//! - A 16-bit number, the stable identity of the slot
//! - A 16-bit version counter, bumped each time the number is recycled
//!
//! The number space is partitioned: a reserved band owned by the host, a
//! static band allocated by the local bump counter, and a host-assigned
//! networked band so concurrently-allocating peers can never collide.

use std::fmt;

/// First number available to the local allocator. Numbers below this are
/// reserved for the host and are never allocated or removed here.
pub const RESERVED_ENTITIES: u16 = 512;

/// Highest allocatable entity number.
pub const MAX_ENTITY_NUMBER: u16 = u16::MAX;

/// Highest version a number can reach. A number whose removal log hits
/// this cap is never recycled again.
pub const MAX_ENTITY_VERSION: u16 = u16::MAX;

/// Unique identifier for an entity.
///
/// The id is split into two parts:
/// - Lower 16 bits: the entity number (identity across versions)
/// - Upper 16 bits: the version counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates an entity id from number and version.
    #[inline]
    #[must_use]
    pub const fn new(number: u16, version: u16) -> Self {
        Self(((version as u32) << 16) | (number as u32))
    }

    /// Reinterprets a raw wire value as an entity id.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-bit value for the wire.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the number portion of the id.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u16 {
        self.0 as u16
    }

    /// Returns the version portion of the id.
    #[inline]
    #[must_use]
    pub const fn version(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Whether the number lies in the host-reserved band.
    #[inline]
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.number() < RESERVED_ENTITIES
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.number(), self.version())
    }
}

/// Lifecycle state of an entity id, as seen by one replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityState {
    /// Number below [`RESERVED_ENTITIES`]; owned by the host.
    Reserved,
    /// This exact (number, version) is live.
    Used,
    /// The removal log records this version (or a later one) as removed.
    Removed,
    /// Never seen by this replica.
    Unknown,
}

/// Inclusive band of entity numbers a peer may allocate networked
/// entities from. Assigned by the host so bands never overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkRange {
    /// First allocatable number.
    pub from: u16,
    /// Last allocatable number.
    pub to: u16,
}

impl NetworkRange {
    /// Whether the range contains `number`.
    #[inline]
    #[must_use]
    pub fn contains(&self, number: u16) -> bool {
        (self.from..=self.to).contains(&number)
    }
}
