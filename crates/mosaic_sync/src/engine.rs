//! # Scene Engine
//!
//! The tick-driven orchestrator. One `update` call runs the full
//! receive / resolve / systems / broadcast cycle to completion:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SCENE ENGINE                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ingress: drain transports, parse frames                 │
//! │  resolve: submit to the register                         │
//! │     won  -> apply to storage, un-dirty, relay to others  │
//! │     lost -> re-send the stored value to the origin       │
//! │  systems: application logic mutates the world            │
//! │  egress:  released entities, then the dirty scan         │
//! │  flush:   one send per transport with queued bytes       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design
//!
//! - Single-threaded and cooperative: the tick loop is the only writer,
//!   so storage and the register can never disagree mid-tick
//! - Inbound bytes buffer inside transports between ticks and are only
//!   consumed here
//! - A fatal decode or codec error aborts the tick through `?` before
//!   any flush, leaving storage and the register consistent

use crate::config::SyncConfig;
use crate::crdt::{CrdtEvent, LwwRegister, WriteOutcome};
use crate::error::SyncError;
use crate::protocol::operations;
use crate::protocol::{framing, CrdtMessage, MessageKind};
use crate::transport::{FilterInfo, Transport};
use mosaic_core::{
    ByteBuffer, Codec, ComponentDefinition, ComponentError, ComponentId, EntityId, EntityState,
    World,
};

/// A registered application system. Runs every tick between resolve and
/// the dirty scan.
pub type SystemFn = Box<dyn FnMut(&mut World, f32)>;

/// One attached transport plus its per-tick buffers.
struct TransportSlot {
    transport: Box<dyn Transport>,
    /// Bytes queued for this tick's flush.
    outgoing: ByteBuffer,
    /// Tail of a frame split across inbound chunks.
    pending: Vec<u8>,
}

/// One parsed inbound frame awaiting resolution.
struct Inbound {
    /// Index of the transport it arrived on.
    origin: usize,
    /// The exact frame bytes, for relaying verbatim.
    raw: Vec<u8>,
    message: CrdtMessage,
}

/// The replicated scene runtime: world state, conflict resolution, and
/// transport orchestration behind one handle.
pub struct SceneEngine {
    world: World,
    register: LwwRegister,
    transports: Vec<TransportSlot>,
    systems: Vec<SystemFn>,
    /// Whether accepted remote frames are relayed to other transports.
    relay: bool,
    tick: u64,
}

impl SceneEngine {
    /// Creates an engine from configuration.
    ///
    /// # Errors
    ///
    /// [`SyncError::Entity`] when the configured networked band is
    /// invalid.
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let mut world = World::new();
        if let Some(range) = config.network_range {
            world.entities_mut().set_network_range(range.into())?;
        }
        Ok(Self {
            world,
            register: LwwRegister::new(),
            transports: Vec::new(),
            systems: Vec::new(),
            relay: config.relay,
            tick: 0,
        })
    }

    /// The replica-local world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The replica-local world, mutably.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Completed tick count.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Allocates a replica-local entity.
    ///
    /// # Errors
    ///
    /// See [`mosaic_core::EntityContainer::generate`].
    pub fn spawn(&mut self) -> Result<EntityId, SyncError> {
        Ok(self.world.spawn(false)?)
    }

    /// Allocates an entity from this peer's networked band.
    ///
    /// # Errors
    ///
    /// See [`mosaic_core::EntityContainer::generate`].
    pub fn spawn_networked(&mut self) -> Result<EntityId, SyncError> {
        Ok(self.world.spawn(true)?)
    }

    /// Removes an entity at the end of this tick. Returns `false` for
    /// reserved ids.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        self.world.despawn(entity)
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
    ) -> Result<(), SyncError> {
        Ok(self.world.define_component(id, name, codec)?)
    }

    /// Typed view of a registered component.
    ///
    /// # Errors
    ///
    /// See [`World::component`].
    pub fn component<C: Codec>(
        &self,
        id: ComponentId,
    ) -> Result<&ComponentDefinition<C>, ComponentError> {
        self.world.component(id)
    }

    /// Typed mutable view of a registered component.
    ///
    /// # Errors
    ///
    /// See [`World::component_mut`].
    pub fn component_mut<C: Codec>(
        &mut self,
        id: ComponentId,
    ) -> Result<&mut ComponentDefinition<C>, ComponentError> {
        self.world.component_mut(id)
    }

    /// Entities holding a value for every listed component.
    #[must_use]
    pub fn entities_with(&self, components: &[ComponentId]) -> Vec<EntityId> {
        self.world.entities_with(components)
    }

    /// Attaches a transport. Takes effect this tick.
    pub fn add_transport(&mut self, transport: impl Transport + 'static) {
        tracing::info!("transport attached: {}", transport.label());
        self.transports.push(TransportSlot {
            transport: Box::new(transport),
            outgoing: ByteBuffer::new(),
            pending: Vec::new(),
        });
    }

    /// Registers an application system.
    pub fn add_system(&mut self, system: impl FnMut(&mut World, f32) + 'static) {
        self.systems.push(Box::new(system));
    }

    /// Runs one tick: receive, resolve, systems, broadcast, flush.
    ///
    /// # Errors
    ///
    /// Fatal protocol or codec errors abort the tick; nothing is flushed
    /// in that case.
    pub fn update(&mut self, dt: f32) -> Result<(), SyncError> {
        self.receive_messages()?;
        for system in &mut self.systems {
            system(&mut self.world, dt);
        }
        self.send_messages()?;
        self.tick += 1;
        Ok(())
    }

    /// Ingress and resolve: drain every transport, submit each frame to
    /// the register, apply or correct.
    fn receive_messages(&mut self) -> Result<(), SyncError> {
        let mut inbound = Vec::new();
        for (origin, slot) in self.transports.iter_mut().enumerate() {
            while let Some(chunk) = slot.transport.poll() {
                let mut bytes = std::mem::take(&mut slot.pending);
                bytes.extend_from_slice(&chunk);

                let mut buf = ByteBuffer::from_bytes(&bytes);
                while framing::validate(&buf) {
                    let start = buf.read_offset();
                    match operations::read(&mut buf)? {
                        Some(message) => inbound.push(Inbound {
                            origin,
                            raw: bytes[start..buf.read_offset()].to_vec(),
                            message,
                        }),
                        None => break,
                    }
                }
                if buf.remaining_bytes() > 0 {
                    // A frame split across chunks: keep the tail for the
                    // next delivery.
                    slot.pending = bytes[buf.read_offset()..].to_vec();
                }
            }
        }

        for frame in inbound {
            match frame.message {
                CrdtMessage::PutComponent {
                    entity,
                    component,
                    timestamp,
                    data,
                } => self.resolve_component_op(
                    frame.origin,
                    entity,
                    component,
                    timestamp,
                    Some(data),
                    &frame.raw,
                )?,
                CrdtMessage::DeleteComponent {
                    entity,
                    component,
                    timestamp,
                } => self.resolve_component_op(
                    frame.origin,
                    entity,
                    component,
                    timestamp,
                    None,
                    &frame.raw,
                )?,
                CrdtMessage::DeleteEntity { entity } => {
                    self.resolve_delete_entity(frame.origin, entity, &frame.raw);
                }
            }
        }
        Ok(())
    }

    /// Resolves one inbound PUT or DELETE against the register.
    fn resolve_component_op(
        &mut self,
        origin: usize,
        entity: EntityId,
        component: ComponentId,
        timestamp: u64,
        data: Option<Vec<u8>>,
        raw: &[u8],
    ) -> Result<(), SyncError> {
        if self.world.entities().state_of(entity) == EntityState::Removed {
            tracing::debug!("dropping operation for removed entity {entity}");
            return Ok(());
        }

        let kind = if data.is_some() {
            MessageKind::PutComponent
        } else {
            MessageKind::DeleteComponent
        };
        let event = CrdtEvent {
            entity,
            component,
            timestamp,
            data,
        };

        match self.register.process(&event) {
            WriteOutcome::Accepted => {
                if kind == MessageKind::PutComponent {
                    let _ = self.world.entities_mut().update_used(entity);
                }
                match self.world.store_mut(component) {
                    Some(store) => {
                        match &event.data {
                            Some(payload) => {
                                let mut payload_buf = ByteBuffer::from_bytes(payload);
                                store.apply_put(entity, &mut payload_buf)?;
                            }
                            None => {
                                let _ = store.apply_delete(entity);
                            }
                        }
                        // The applied value is remote truth, not a
                        // pending local change.
                        store.clear_dirty_entity(entity);
                    }
                    None => {
                        tracing::warn!(
                            "no component registered under {component}; kept in register only"
                        );
                    }
                }
                if self.relay {
                    let info = FilterInfo {
                        kind,
                        entity,
                        component: Some(component),
                        timestamp,
                    };
                    self.relay_raw(origin, raw, &info);
                }
            }
            WriteOutcome::Unchanged => {}
            WriteOutcome::Outdated => {
                tracing::debug!(
                    "stale write for {entity} {component}; correcting the sender"
                );
                self.queue_correction(origin, entity, component);
            }
        }
        Ok(())
    }

    /// Resolves one inbound whole-entity removal.
    fn resolve_delete_entity(&mut self, origin: usize, entity: EntityId, raw: &[u8]) {
        let _ = self.world.entities_mut().update_removed(entity);
        self.world.for_each_store_mut(|store| store.purge(entity));
        self.register.drop_entity(entity);
        if self.relay {
            let info = FilterInfo {
                kind: MessageKind::DeleteEntity,
                entity,
                component: None,
                timestamp: 0,
            };
            self.relay_raw(origin, raw, &info);
        }
    }

    /// Queues a verbatim frame on every transport except its origin.
    fn relay_raw(&mut self, origin: usize, raw: &[u8], info: &FilterInfo) {
        for (index, slot) in self.transports.iter_mut().enumerate() {
            if index != origin && slot.transport.filter(info) {
                slot.outgoing.write_bytes(raw);
            }
        }
    }

    /// Queues the register's stored value for the transport a stale
    /// write arrived on. Corrections bypass the egress filter; the stale
    /// sender must always be healed.
    fn queue_correction(&mut self, origin: usize, entity: EntityId, component: ComponentId) {
        let Some(entry) = self.register.entry(entity, component) else {
            return;
        };
        let slot = &mut self.transports[origin];
        match &entry.data {
            Some(payload) => operations::write_put_raw(
                entity,
                component,
                entry.timestamp,
                payload,
                &mut slot.outgoing,
            ),
            None => {
                operations::write_delete(entity, component, entry.timestamp, &mut slot.outgoing);
            }
        }
    }

    /// Egress: fold pending removals, diff the dirty sets into events,
    /// and flush each transport once.
    fn send_messages(&mut self) -> Result<(), SyncError> {
        // Released entities first, so the dirty scan never broadcasts
        // state for an entity dying this tick.
        let released = self.world.entities_mut().release_removed();
        for entity in &released {
            self.world.for_each_store_mut(|store| store.purge(*entity));
            self.register.drop_entity(*entity);
        }

        for component in self.world.component_ids() {
            let Some(store) = self.world.store(component) else {
                continue;
            };
            for entity in store.dirty_entities() {
                let Some(store) = self.world.store(component) else {
                    break;
                };
                // Write or tombstone is derived from current existence,
                // not tracked per edit.
                let kind = operations::operation_kind(store, entity);
                let data = if kind == MessageKind::PutComponent {
                    let mut payload = ByteBuffer::new();
                    store.write_value(entity, &mut payload)?;
                    Some(payload.to_vec())
                } else {
                    None
                };

                let event = self.register.create_event(entity, component, data);
                let info = FilterInfo {
                    kind,
                    entity,
                    component: Some(component),
                    timestamp: event.timestamp,
                };

                let targets: Vec<usize> = self
                    .transports
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.transport.filter(&info))
                    .map(|(index, _)| index)
                    .collect();
                if targets.is_empty() {
                    continue;
                }

                let mut frame = ByteBuffer::new();
                match &event.data {
                    Some(payload) => operations::write_put_raw(
                        entity,
                        component,
                        event.timestamp,
                        payload,
                        &mut frame,
                    ),
                    None => {
                        operations::write_delete(entity, component, event.timestamp, &mut frame);
                    }
                }
                for index in targets {
                    self.transports[index].outgoing.write_bytes(frame.written());
                }
            }
            if let Some(store) = self.world.store_mut(component) {
                store.clear_dirty();
            }
        }

        for entity in released {
            let info = FilterInfo {
                kind: MessageKind::DeleteEntity,
                entity,
                component: None,
                timestamp: 0,
            };
            let mut frame = ByteBuffer::new();
            operations::write_delete_entity(entity, &mut frame);
            for slot in &mut self.transports {
                if slot.transport.filter(&info) {
                    slot.outgoing.write_bytes(frame.written());
                }
            }
        }

        for slot in &mut self.transports {
            if slot.outgoing.write_offset() > 0 {
                let bytes = slot.outgoing.to_vec();
                slot.outgoing.reset();
                slot.transport.send(&bytes)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use mosaic_core::PodCodec;

    const HEALTH: ComponentId = ComponentId(1);

    #[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Health {
        current: u32,
    }

    fn engine_with_far_end() -> (SceneEngine, MemoryTransport) {
        let (near, far) = MemoryTransport::pair();
        let mut engine = SceneEngine::new(SyncConfig::default()).unwrap();
        engine
            .define_component(HEALTH, "health", PodCodec::<Health>::new(HEALTH))
            .unwrap();
        engine.add_transport(near);
        (engine, far)
    }

    #[test]
    fn test_local_create_is_flushed_once() {
        let (mut engine, mut far) = engine_with_far_end();
        let entity = engine.spawn().unwrap();
        engine
            .component_mut::<PodCodec<Health>>(HEALTH)
            .unwrap()
            .create(entity, Health { current: 9 })
            .unwrap();

        engine.update(0.016).unwrap();

        let chunk = far.poll().expect("one flush");
        let mut buf = ByteBuffer::from_bytes(&chunk);
        let message = operations::read(&mut buf).unwrap().unwrap();
        assert_eq!(message.kind(), MessageKind::PutComponent);
        assert_eq!(message.entity(), entity);
        assert_eq!(far.poll(), None);

        // Clean tick, nothing new to say.
        engine.update(0.016).unwrap();
        assert_eq!(far.poll(), None);
    }

    #[test]
    fn test_remote_put_applies_without_redirty() {
        let (mut engine, mut far) = engine_with_far_end();
        let entity = EntityId::new(600, 0);

        let mut frame = ByteBuffer::new();
        operations::write_put_raw(
            entity,
            HEALTH,
            5,
            bytemuck::bytes_of(&Health { current: 3 }),
            &mut frame,
        );
        far.send(&frame.to_vec()).unwrap();

        engine.update(0.016).unwrap();

        let stored = engine
            .component::<PodCodec<Health>>(HEALTH)
            .unwrap()
            .get(entity)
            .unwrap();
        assert_eq!(stored.current, 3);
        // The applied write must not bounce back as a local change.
        assert_eq!(far.poll(), None);
    }

    #[test]
    fn test_stale_put_gets_corrected() {
        let (mut engine, mut far) = engine_with_far_end();
        let entity = engine.spawn().unwrap();
        engine
            .component_mut::<PodCodec<Health>>(HEALTH)
            .unwrap()
            .create(entity, Health { current: 10 })
            .unwrap();
        engine.update(0.016).unwrap();
        let minted = far.poll().expect("initial broadcast");

        // A peer answers with an older timestamp.
        let mut stale = ByteBuffer::new();
        operations::write_put_raw(
            entity,
            HEALTH,
            0,
            bytemuck::bytes_of(&Health { current: 1 }),
            &mut stale,
        );
        far.send(&stale.to_vec()).unwrap();
        engine.update(0.016).unwrap();

        // Local value untouched, the authoritative frame re-sent.
        assert_eq!(
            engine
                .component::<PodCodec<Health>>(HEALTH)
                .unwrap()
                .get(entity)
                .unwrap()
                .current,
            10
        );
        let correction = far.poll().expect("correction");
        assert_eq!(correction, minted);
    }

    #[test]
    fn test_unknown_kind_aborts_tick() {
        let (mut engine, mut far) = engine_with_far_end();
        let mut junk = ByteBuffer::new();
        junk.write_u32(12);
        junk.write_u32(77);
        junk.write_u32(0);
        far.send(&junk.to_vec()).unwrap();

        assert!(matches!(
            engine.update(0.016),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn test_despawn_broadcasts_delete_entity() {
        let (mut engine, mut far) = engine_with_far_end();
        let entity = engine.spawn().unwrap();
        engine
            .component_mut::<PodCodec<Health>>(HEALTH)
            .unwrap()
            .create(entity, Health { current: 1 })
            .unwrap();
        engine.update(0.016).unwrap();
        let _ = far.poll();

        engine.despawn(entity);
        engine.update(0.016).unwrap();

        let chunk = far.poll().expect("delete notification");
        let mut buf = ByteBuffer::from_bytes(&chunk);
        let message = operations::read(&mut buf).unwrap().unwrap();
        assert_eq!(message, CrdtMessage::DeleteEntity { entity });
        assert_eq!(engine.world().entities().state_of(entity), EntityState::Removed);
    }

    #[test]
    fn test_split_frame_across_chunks_reassembles() {
        let (mut engine, mut far) = engine_with_far_end();
        let entity = EntityId::new(600, 0);

        let mut frame = ByteBuffer::new();
        operations::write_put_raw(
            entity,
            HEALTH,
            5,
            bytemuck::bytes_of(&Health { current: 8 }),
            &mut frame,
        );
        let bytes = frame.to_vec();
        let (head, tail) = bytes.split_at(10);

        far.send(head).unwrap();
        engine.update(0.016).unwrap();
        assert!(engine
            .component::<PodCodec<Health>>(HEALTH)
            .unwrap()
            .get_or_none(entity)
            .is_none());

        far.send(tail).unwrap();
        engine.update(0.016).unwrap();
        assert_eq!(
            engine
                .component::<PodCodec<Health>>(HEALTH)
                .unwrap()
                .get(entity)
                .unwrap()
                .current,
            8
        );
    }

    #[test]
    fn test_system_runs_each_tick() {
        let (mut engine, mut far) = engine_with_far_end();
        let entity = engine.spawn().unwrap();
        engine
            .component_mut::<PodCodec<Health>>(HEALTH)
            .unwrap()
            .create(entity, Health { current: 0 })
            .unwrap();
        engine.add_system(move |world, _dt| {
            let health = world
                .component_mut::<PodCodec<Health>>(HEALTH)
                .unwrap()
                .get_mutable(entity)
                .unwrap();
            health.current += 1;
        });

        engine.update(0.016).unwrap();
        engine.update(0.016).unwrap();

        assert_eq!(
            engine
                .component::<PodCodec<Health>>(HEALTH)
                .unwrap()
                .get(entity)
                .unwrap()
                .current,
            2
        );
        assert_eq!(engine.tick(), 2);
        assert_eq!(engine.entities_with(&[HEALTH]), vec![entity]);
        // Every tick's mutation is broadcast.
        assert!(far.poll().is_some());
        assert!(far.poll().is_some());
    }
}
