//! # Last-Write-Wins Register
//!
//! The convergence core: one timestamped cell per (entity, component)
//! key. Competing writes are resolved by logical timestamp, with a
//! deterministic byte-wise tie-break so every replica that sees the same
//! two events picks the same winner, regardless of arrival order.
//!
//! ## Design
//!
//! - Timestamps are Lamport-style logical clocks, one per key: minting a
//!   local event always produces a timestamp strictly above the stored
//!   one, so a replica's own writes are locally newest
//! - A tombstone (`data: None`) orders below every payload, so at equal
//!   timestamps a concurrent write beats a concurrent delete everywhere
//! - A losing submission is not an error; the caller re-broadcasts the
//!   stored value so the stale writer converges

use mosaic_core::{ComponentId, EntityId};
use std::collections::HashMap;

/// Key of one replicated cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CrdtKey {
    /// The entity.
    pub entity: EntityId,
    /// The component.
    pub component: ComponentId,
}

/// Stored state of one replicated cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LwwEntry {
    /// Logical timestamp of the winning write.
    pub timestamp: u64,
    /// Winning payload; `None` is a tombstone.
    pub data: Option<Vec<u8>>,
}

/// One submitted write (local or remote).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrdtEvent {
    /// Target entity.
    pub entity: EntityId,
    /// Target component.
    pub component: ComponentId,
    /// The writer's logical timestamp.
    pub timestamp: u64,
    /// Payload; `None` is a tombstone.
    pub data: Option<Vec<u8>>,
}

impl CrdtEvent {
    /// The cell this event addresses.
    #[must_use]
    pub const fn key(&self) -> CrdtKey {
        CrdtKey {
            entity: self.entity,
            component: self.component,
        }
    }
}

/// Outcome of submitting an event to the register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The event won; it is now the stored value and must be applied to
    /// component storage.
    Accepted,
    /// The event is byte-identical to the stored value at the same
    /// timestamp; an idempotent duplicate, nothing to do.
    Unchanged,
    /// The event lost to a newer (or tie-winning) stored value; the
    /// stored value should be re-sent to the event's origin.
    Outdated,
}

/// The replica's conflict-resolution state across all keys.
#[derive(Debug, Default)]
pub struct LwwRegister {
    entries: HashMap<CrdtKey, LwwEntry>,
}

impl LwwRegister {
    /// Creates an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints an event for a local change and stores it as the key's
    /// authoritative value.
    ///
    /// The timestamp is strictly greater than anything this replica has
    /// stored for the key, including accepted remote writes.
    pub fn create_event(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        data: Option<Vec<u8>>,
    ) -> CrdtEvent {
        let key = CrdtKey { entity, component };
        let timestamp = self.entries.get(&key).map_or(1, |entry| entry.timestamp + 1);
        self.entries.insert(
            key,
            LwwEntry {
                timestamp,
                data: data.clone(),
            },
        );
        CrdtEvent {
            entity,
            component,
            timestamp,
            data,
        }
    }

    /// Submits an event (local or remote) and resolves it against the
    /// stored value.
    pub fn process(&mut self, event: &CrdtEvent) -> WriteOutcome {
        let key = event.key();
        match self.entries.get_mut(&key) {
            None => {
                self.entries.insert(
                    key,
                    LwwEntry {
                        timestamp: event.timestamp,
                        data: event.data.clone(),
                    },
                );
                WriteOutcome::Accepted
            }
            Some(stored) => match event.timestamp.cmp(&stored.timestamp) {
                std::cmp::Ordering::Greater => {
                    stored.timestamp = event.timestamp;
                    stored.data.clone_from(&event.data);
                    WriteOutcome::Accepted
                }
                std::cmp::Ordering::Less => WriteOutcome::Outdated,
                // Equal timestamps: byte-wise tie-break, tombstone lowest.
                std::cmp::Ordering::Equal => match event.data.cmp(&stored.data) {
                    std::cmp::Ordering::Greater => {
                        stored.data.clone_from(&event.data);
                        WriteOutcome::Accepted
                    }
                    std::cmp::Ordering::Equal => WriteOutcome::Unchanged,
                    std::cmp::Ordering::Less => WriteOutcome::Outdated,
                },
            },
        }
    }

    /// The stored value for a key, if any.
    #[must_use]
    pub fn entry(&self, entity: EntityId, component: ComponentId) -> Option<&LwwEntry> {
        self.entries.get(&CrdtKey { entity, component })
    }

    /// Discards every key of a hard-removed entity. The grow-only
    /// removal log makes resurrection impossible, so the cells can never
    /// be contested again.
    pub fn drop_entity(&mut self, entity: EntityId) {
        self.entries.retain(|key, _| key.entity != entity);
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the register tracks no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
