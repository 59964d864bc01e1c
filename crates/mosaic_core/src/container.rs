//! # Entity Container
//!
//! Allocates, recycles, and tracks the lifecycle of entity ids.
//!
//! ## Design
//!
//! - Allocation prefers recycling a removed number (with a bumped
//!   version) to keep the live number space compact
//! - Removal is deferred: a removed entity leaves the used table at once
//!   but only reaches the removal log at end of tick, so the allocator
//!   cannot re-issue a number other code still observes this tick
//! - The removal log is grow-only: one `number -> highest removed
//!   version` slot per number, raise-only, which makes "was this id ever
//!   removed" a cheap monotonic membership check even when removals are
//!   reported concurrently by local and remote sources

use crate::entity::{
    EntityId, EntityState, NetworkRange, MAX_ENTITY_NUMBER, MAX_ENTITY_VERSION, RESERVED_ENTITIES,
};
use crate::error::EntityError;
use std::collections::HashMap;

/// Allocator and lifecycle tracker for entity ids.
///
/// The used table maps each live number to its live version; at most one
/// version of a number is ever live on a replica.
#[derive(Debug)]
pub struct EntityContainer {
    /// Next unused static number. Starts past the reserved band.
    entity_counter: u32,
    /// Next unused networked number, valid once a range is configured.
    network_counter: u32,
    /// Host-assigned networked band.
    network_range: Option<NetworkRange>,
    /// Live entities: number -> version.
    used: HashMap<u16, u16>,
    /// Entities removed this tick, not yet folded into the removal log.
    pending_removal: Vec<EntityId>,
    /// Grow-only removal log: number -> highest removed version.
    removed: HashMap<u16, u16>,
}

impl EntityContainer {
    /// Creates an empty container with the static counter at the start of
    /// the allocatable band.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entity_counter: u32::from(RESERVED_ENTITIES),
            network_counter: 0,
            network_range: None,
            used: HashMap::new(),
            pending_removal: Vec::new(),
            removed: HashMap::new(),
        }
    }

    /// Assigns the networked band this peer may allocate from.
    ///
    /// Configuring twice is allowed only with the identical range. The
    /// band must be ordered, outside the reserved band, and past the
    /// static numbers already handed out.
    pub fn set_network_range(&mut self, range: NetworkRange) -> Result<(), EntityError> {
        if let Some(existing) = self.network_range {
            if existing == range {
                return Ok(());
            }
            return Err(EntityError::InvalidNetworkRange {
                from: range.from,
                to: range.to,
            });
        }
        if range.from > range.to
            || range.from < RESERVED_ENTITIES
            || u32::from(range.from) < self.entity_counter
        {
            return Err(EntityError::InvalidNetworkRange {
                from: range.from,
                to: range.to,
            });
        }
        self.network_counter = u32::from(range.from);
        self.network_range = Some(range);
        Ok(())
    }

    /// Returns the configured networked band, if any.
    #[must_use]
    pub const fn network_range(&self) -> Option<NetworkRange> {
        self.network_range
    }

    /// Allocates an entity id.
    ///
    /// Recycles a removed number (version bumped) when one is available
    /// in the caller's band and not in flight this tick; otherwise bumps
    /// the band's counter.
    ///
    /// # Errors
    ///
    /// [`EntityError::StaticRangeExhausted`] when the static counter
    /// would pass [`MAX_ENTITY_NUMBER`];
    /// [`EntityError::NetworkRangeNotConfigured`] and
    /// [`EntityError::NetworkRangeExhausted`] for networked requests.
    pub fn generate(&mut self, networked: bool) -> Result<EntityId, EntityError> {
        if networked && self.network_range.is_none() {
            return Err(EntityError::NetworkRangeNotConfigured);
        }
        if !networked && !self.static_numbers_have_holes() {
            return self.bump_static();
        }
        if let Some(id) = self.recycle(networked) {
            return Ok(id);
        }
        if networked {
            self.bump_network()
        } else {
            self.bump_static()
        }
    }

    /// Whether any static number below the counter is free for recycling.
    ///
    /// When the used count has kept pace with the counter there are no
    /// holes and the scan can be skipped.
    fn static_numbers_have_holes(&self) -> bool {
        let static_used = self
            .used
            .keys()
            .filter(|number| self.is_static_number(**number))
            .count();
        static_used + usize::from(RESERVED_ENTITIES) < self.entity_counter as usize
    }

    /// Whether `number` belongs to the static band (allocatable, not in
    /// the networked band).
    fn is_static_number(&self, number: u16) -> bool {
        number >= RESERVED_ENTITIES
            && !self
                .network_range
                .is_some_and(|range| range.contains(number))
    }

    /// Scans the removal log for a recyclable number in the caller's
    /// band.
    ///
    /// A candidate must not be capped, not be live, and not be pending
    /// removal this tick (it is still logically in flight).
    fn recycle(&mut self, networked: bool) -> Option<EntityId> {
        let range = self.network_range;
        let candidate = self
            .removed
            .iter()
            .filter(|(_, version)| **version < MAX_ENTITY_VERSION)
            .filter(|(number, _)| {
                if networked {
                    range.is_some_and(|r| r.contains(**number))
                } else {
                    self.is_static_number(**number)
                }
            })
            .map(|(number, version)| EntityId::new(*number, version + 1))
            .find(|id| {
                !self.used.contains_key(&id.number())
                    && !self
                        .pending_removal
                        .iter()
                        .any(|pending| pending.number() == id.number())
            })?;
        self.used.insert(candidate.number(), candidate.version());
        Some(candidate)
    }

    /// Takes a brand-new number from the static counter.
    fn bump_static(&mut self) -> Result<EntityId, EntityError> {
        loop {
            if self.entity_counter > u32::from(MAX_ENTITY_NUMBER) {
                return Err(EntityError::StaticRangeExhausted {
                    limit: MAX_ENTITY_NUMBER,
                });
            }
            let number = self.entity_counter as u16;
            self.entity_counter += 1;
            // Skip numbers the networked band owns or that a remote
            // replica already told us about.
            if !self.is_static_number(number) || self.used.contains_key(&number) {
                continue;
            }
            if let Some(id) = self.issue_fresh(number) {
                return Ok(id);
            }
        }
    }

    /// Takes a brand-new number from the networked counter.
    fn bump_network(&mut self) -> Result<EntityId, EntityError> {
        let range = self
            .network_range
            .ok_or(EntityError::NetworkRangeNotConfigured)?;
        loop {
            if self.network_counter > u32::from(range.to) {
                return Err(EntityError::NetworkRangeExhausted {
                    from: range.from,
                    to: range.to,
                });
            }
            let number = self.network_counter as u16;
            self.network_counter += 1;
            if self.used.contains_key(&number) {
                continue;
            }
            if let Some(id) = self.issue_fresh(number) {
                return Ok(id);
            }
        }
    }

    /// Marks `number` used at the version after its logged removal, or 0
    /// if it was never removed. `None` when the number's versions are
    /// exhausted.
    fn issue_fresh(&mut self, number: u16) -> Option<EntityId> {
        let version = match self.removed.get(&number) {
            Some(&v) if v >= MAX_ENTITY_VERSION => return None,
            Some(&v) => v + 1,
            None => 0,
        };
        self.used.insert(number, version);
        Some(EntityId::new(number, version))
    }

    /// Removes an entity.
    ///
    /// Reserved ids refuse and return `false`. A live entity leaves the
    /// used table immediately and is folded into the removal log at
    /// [`release_removed`](Self::release_removed); removing an id that is
    /// not live updates the log directly (idempotent).
    pub fn remove(&mut self, entity: EntityId) -> bool {
        if entity.is_reserved() {
            return false;
        }
        match self.used.get(&entity.number()) {
            Some(&version) if version == entity.version() => {
                self.used.remove(&entity.number());
                self.pending_removal.push(entity);
            }
            _ => self.raise_removed(entity.number(), entity.version()),
        }
        true
    }

    /// End-of-tick hook: folds pending removals into the removal log and
    /// returns them so the caller can emit delete notifications.
    pub fn release_removed(&mut self) -> Vec<EntityId> {
        let released = std::mem::take(&mut self.pending_removal);
        for entity in &released {
            self.raise_removed(entity.number(), entity.version());
        }
        released
    }

    /// Applies a remotely observed removal.
    ///
    /// Raises the removal log and evicts any live entry of the same
    /// number at an equal-or-lower version, so this replica converges to
    /// the bookkeeping it would have had performing the removal locally.
    pub fn update_removed(&mut self, entity: EntityId) -> bool {
        self.raise_removed(entity.number(), entity.version());
        if self
            .used
            .get(&entity.number())
            .is_some_and(|version| *version <= entity.version())
        {
            self.used.remove(&entity.number());
        }
        true
    }

    /// Applies a remotely observed usage.
    ///
    /// Rejects ids the removal log already covers (known dead, never
    /// resurrected) and ids older than the live version of the same
    /// number.
    pub fn update_used(&mut self, entity: EntityId) -> bool {
        if self
            .removed
            .get(&entity.number())
            .is_some_and(|version| *version >= entity.version())
        {
            return false;
        }
        match self.used.get(&entity.number()) {
            Some(&version) if version > entity.version() => false,
            _ => {
                self.used.insert(entity.number(), entity.version());
                true
            }
        }
    }

    /// Pure lifecycle query for an id.
    #[must_use]
    pub fn state_of(&self, entity: EntityId) -> EntityState {
        if entity.is_reserved() {
            return EntityState::Reserved;
        }
        if self.used.get(&entity.number()) == Some(&entity.version()) {
            return EntityState::Used;
        }
        if self
            .removed
            .get(&entity.number())
            .is_some_and(|version| *version >= entity.version())
        {
            return EntityState::Removed;
        }
        EntityState::Unknown
    }

    /// Number of live entities.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Iterates the live entities.
    pub fn used_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.used
            .iter()
            .map(|(number, version)| EntityId::new(*number, *version))
    }

    /// Raise-only update of the removal log.
    fn raise_removed(&mut self, number: u16, version: u16) {
        let slot = self.removed.entry(number).or_insert(version);
        if *slot < version {
            *slot = version;
        }
    }
}

impl Default for EntityContainer {
    fn default() -> Self {
        Self::new()
    }
}
