//! Two-replica convergence scenarios over in-memory transports.

use mosaic_core::{ByteBuffer, ComponentId, EntityId, PodCodec};
use mosaic_sync::protocol::operations;
use mosaic_sync::{
    CrdtMessage, MemoryTransport, MessageKind, RangeConfig, SceneEngine, SyncConfig, Transport,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TRANSFORM: ComponentId = ComponentId(1);
const DT: f32 = 0.016;

#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Transform {
    x: f32,
    y: f32,
    z: f32,
}

impl Transform {
    fn at(x: f32) -> Self {
        Self { x, y: 0.0, z: 0.0 }
    }
}

fn networked_engine() -> SceneEngine {
    let config = SyncConfig {
        network_range: Some(RangeConfig { from: 40_000, to: 41_000 }),
        ..SyncConfig::default()
    };
    let mut engine = SceneEngine::new(config).unwrap();
    engine
        .define_component(TRANSFORM, "transform", PodCodec::<Transform>::new(TRANSFORM))
        .unwrap();
    engine
}

fn connected_pair() -> (SceneEngine, SceneEngine) {
    let (left, right) = MemoryTransport::pair();
    let mut a = networked_engine();
    let mut b = networked_engine();
    a.add_transport(left);
    b.add_transport(right);
    (a, b)
}

fn transform_of(engine: &SceneEngine, entity: EntityId) -> Option<Transform> {
    engine
        .component::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .get_or_none(entity)
        .copied()
}

#[test]
fn concurrent_creates_converge_to_one_value() {
    let (mut a, mut b) = connected_pair();

    // Both peers allocate from the same assigned band, so the first
    // networked entity has the same id on both.
    let entity_a = a.spawn_networked().unwrap();
    let entity_b = b.spawn_networked().unwrap();
    assert_eq!(entity_a, entity_b);

    a.component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .create(entity_a, Transform::at(1.0))
        .unwrap();
    b.component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .create(entity_b, Transform::at(2.0))
        .unwrap();

    // Tick until the broadcasts and any tie-break correction settle.
    for _ in 0..4 {
        a.update(DT).unwrap();
        b.update(DT).unwrap();
    }

    let value_a = transform_of(&a, entity_a).expect("value on a");
    let value_b = transform_of(&b, entity_b).expect("value on b");
    assert_eq!(value_a, value_b);
    assert!(value_a == Transform::at(1.0) || value_a == Transform::at(2.0));
}

#[test]
fn delete_survives_stale_put_and_is_resent() {
    let (near, mut far) = MemoryTransport::pair();
    let mut engine = networked_engine();
    engine.add_transport(near);

    let entity = engine.spawn_networked().unwrap();
    engine
        .component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .create(entity, Transform::at(5.0))
        .unwrap();
    engine.update(DT).unwrap();
    let _initial_put = far.poll().expect("initial broadcast");

    engine
        .component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .delete_from(entity);
    engine.update(DT).unwrap();
    let delete_frame = far.poll().expect("delete broadcast");

    // The peer answers with a PUT older than the delete.
    let mut stale = ByteBuffer::new();
    operations::write_put_raw(
        entity,
        TRANSFORM,
        1,
        bytemuck::bytes_of(&Transform::at(9.0)),
        &mut stale,
    );
    far.send(&stale.to_vec()).unwrap();
    engine.update(DT).unwrap();

    // Still deleted locally.
    assert!(transform_of(&engine, entity).is_none());

    // And the delete went back to the stale sender.
    let correction = far.poll().expect("correction frame");
    assert_eq!(correction, delete_frame);
    let mut buf = ByteBuffer::from_bytes(&correction);
    let message = operations::read(&mut buf).unwrap().unwrap();
    assert_eq!(message.kind(), MessageKind::DeleteComponent);
}

#[test]
fn relay_gossips_accepted_writes_to_other_transports() {
    // A <-> B <-> C: B relays what it accepts from A on to C.
    let (a_end, b_left) = MemoryTransport::pair();
    let (b_right, c_end) = MemoryTransport::pair();

    let mut a = networked_engine();
    let mut b = networked_engine();
    let mut c = networked_engine();
    a.add_transport(a_end);
    b.add_transport(b_left);
    b.add_transport(b_right);
    c.add_transport(c_end);

    let entity = a.spawn_networked().unwrap();
    a.component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .create(entity, Transform::at(3.0))
        .unwrap();

    a.update(DT).unwrap();
    b.update(DT).unwrap();
    c.update(DT).unwrap();

    assert_eq!(transform_of(&b, entity), Some(Transform::at(3.0)));
    assert_eq!(transform_of(&c, entity), Some(Transform::at(3.0)));
}

#[test]
fn entity_delete_propagates_and_blocks_resurrection() {
    let (mut a, mut b) = connected_pair();

    let entity = a.spawn_networked().unwrap();
    let _ = b.spawn_networked().unwrap();
    a.component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .create(entity, Transform::at(1.0))
        .unwrap();
    for _ in 0..2 {
        a.update(DT).unwrap();
        b.update(DT).unwrap();
    }
    assert!(transform_of(&b, entity).is_some());

    a.despawn(entity);
    for _ in 0..2 {
        a.update(DT).unwrap();
        b.update(DT).unwrap();
    }

    assert!(transform_of(&a, entity).is_none());
    assert!(transform_of(&b, entity).is_none());
    assert_eq!(
        a.world().entities().state_of(entity),
        mosaic_core::EntityState::Removed
    );
    assert_eq!(
        b.world().entities().state_of(entity),
        mosaic_core::EntityState::Removed
    );
    // A late write for the dead entity changes nothing.
    assert!(!b.world_mut().entities_mut().update_used(entity));
}

/// Chaos harness: the test owns both far ends and shuttles chunks with
/// seeded duplication, reordering, and delay. After the noisy rounds a
/// few clean rounds let corrections settle; both replicas must agree.
#[test]
fn randomized_delivery_still_converges() {
    let (a_near, mut a_far) = MemoryTransport::pair();
    let (b_near, mut b_far) = MemoryTransport::pair();
    let mut a = networked_engine();
    let mut b = networked_engine();
    a.add_transport(a_near);
    b.add_transport(b_near);

    let entity = a.spawn_networked().unwrap();
    assert_eq!(b.spawn_networked().unwrap(), entity);

    let mut rng = StdRng::seed_from_u64(0x4D05_A1C0);
    let mut to_a: Vec<Vec<u8>> = Vec::new();
    let mut to_b: Vec<Vec<u8>> = Vec::new();

    for round in 0..40 {
        // Each replica edits the shared entity on its own schedule.
        if rng.gen_bool(0.7) {
            a.component_mut::<PodCodec<Transform>>(TRANSFORM)
                .unwrap()
                .create_or_replace(entity, Transform::at(round as f32));
        }
        if rng.gen_bool(0.7) {
            b.component_mut::<PodCodec<Transform>>(TRANSFORM)
                .unwrap()
                .create_or_replace(entity, Transform::at(-(round as f32)));
        }
        if rng.gen_bool(0.1) {
            a.component_mut::<PodCodec<Transform>>(TRANSFORM)
                .unwrap()
                .delete_from(entity);
        }

        a.update(DT).unwrap();
        b.update(DT).unwrap();

        while let Some(chunk) = a_far.poll() {
            to_b.push(chunk);
        }
        while let Some(chunk) = b_far.poll() {
            to_a.push(chunk);
        }

        // Deliver a random prefix, duplicated and out of order.
        deliver_some(&mut rng, &mut to_a, &mut a_far);
        deliver_some(&mut rng, &mut to_b, &mut b_far);
    }

    // Quiet period: everything still in flight gets through, possibly
    // twice, and the self-healing corrections settle.
    for _ in 0..8 {
        for chunk in to_a.drain(..) {
            a_far.send(&chunk).unwrap();
        }
        for chunk in to_b.drain(..) {
            b_far.send(&chunk).unwrap();
        }
        a.update(DT).unwrap();
        b.update(DT).unwrap();
        while let Some(chunk) = a_far.poll() {
            to_b.push(chunk);
        }
        while let Some(chunk) = b_far.poll() {
            to_a.push(chunk);
        }
    }

    assert_eq!(transform_of(&a, entity), transform_of(&b, entity));
}

fn deliver_some(rng: &mut StdRng, queue: &mut Vec<Vec<u8>>, endpoint: &mut MemoryTransport) {
    let mut held = Vec::new();
    while let Some(index) = pick(rng, queue.len()) {
        let chunk = queue.swap_remove(index);
        match rng.gen_range(0..10) {
            // Duplicate delivery.
            0..=1 => {
                endpoint.send(&chunk).unwrap();
                endpoint.send(&chunk).unwrap();
            }
            // Delay to a later round.
            2..=3 => held.push(chunk),
            _ => endpoint.send(&chunk).unwrap(),
        }
    }
    queue.append(&mut held);
}

fn pick(rng: &mut StdRng, len: usize) -> Option<usize> {
    if len == 0 || rng.gen_bool(0.3) {
        return None;
    }
    Some(rng.gen_range(0..len))
}

#[test]
fn filtered_transport_never_sees_unwanted_kinds() {
    let (near, mut far) = MemoryTransport::pair();
    // This channel only wants whole-entity lifecycle traffic.
    let near = near
        .with_label("lifecycle-feed")
        .with_filter(|info| info.kind == MessageKind::DeleteEntity);

    let mut engine = networked_engine();
    engine.add_transport(near);

    let entity = engine.spawn_networked().unwrap();
    engine
        .component_mut::<PodCodec<Transform>>(TRANSFORM)
        .unwrap()
        .create(entity, Transform::at(1.0))
        .unwrap();
    engine.update(DT).unwrap();
    assert_eq!(far.poll(), None);

    engine.despawn(entity);
    engine.update(DT).unwrap();
    let chunk = far.poll().expect("delete entity frame");
    let mut buf = ByteBuffer::from_bytes(&chunk);
    assert_eq!(
        operations::read(&mut buf).unwrap().unwrap(),
        CrdtMessage::DeleteEntity { entity }
    );
}
