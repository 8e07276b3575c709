//! GC correctness tests
//!
//! These tests verify that the pin-counting mark/sweep collector handles
//! garbage, cycles, roots and stale handles correctly.

use keel_gc::{AllocationRegistry, GcConfig, GcError, Handle, Tracer};

/// Simple test object with outgoing references
struct TestObject {
    value: i32,
    references: Vec<Handle>,
}

impl TestObject {
    fn leaf(value: i32) -> Self {
        Self {
            value,
            references: Vec::new(),
        }
    }
}

fn trace(_handle: Handle, object: &TestObject, tracer: &mut Tracer<'_, TestObject>) {
    for &target in &object.references {
        tracer.edge(target);
    }
}

/// Store a reference the way a heap object does: pin the target
fn link(registry: &mut AllocationRegistry<TestObject>, from: Handle, to: Handle) {
    registry.pin(to).unwrap();
    registry.get_mut(from).unwrap().references.push(to);
}

#[test]
fn test_collect_simple_garbage() {
    let mut registry = AllocationRegistry::new();
    registry.allocate(TestObject::leaf(42), 64).unwrap();

    assert_eq!(registry.allocation_count(), 1);
    assert_eq!(registry.total_bytes(), 64);

    // Force GC with no roots
    let reclaimed = registry.collect(&[], trace, |_, _| {});

    assert_eq!(reclaimed, 64);
    assert_eq!(registry.allocation_count(), 0);
    assert_eq!(registry.total_bytes(), 0);
}

#[test]
fn test_circular_references_collected() {
    let mut registry = AllocationRegistry::new();
    let a = registry.allocate(TestObject::leaf(1), 32).unwrap();
    let b = registry.allocate(TestObject::leaf(2), 32).unwrap();
    link(&mut registry, a, b);
    link(&mut registry, b, a);

    let mut finalized = Vec::new();
    let reclaimed = registry.collect(&[], trace, |_, object| finalized.push(object.value));

    assert_eq!(reclaimed, 64);
    finalized.sort();
    assert_eq!(finalized, vec![1, 2]);
    assert_eq!(registry.stats().last_freed, 2);
}

#[test]
fn test_self_cycle_collected() {
    let mut registry = AllocationRegistry::new();
    let a = registry.allocate(TestObject::leaf(1), 16).unwrap();
    link(&mut registry, a, a);

    registry.collect(&[], trace, |_, _| {});
    assert!(!registry.contains(a));
}

#[test]
fn test_pinned_chain_survives() {
    let mut registry = AllocationRegistry::new();
    let root = registry.allocate(TestObject::leaf(0), 16).unwrap();
    let mid = registry.allocate(TestObject::leaf(1), 16).unwrap();
    let tail = registry.allocate(TestObject::leaf(2), 16).unwrap();
    let garbage = registry.allocate(TestObject::leaf(3), 16).unwrap();
    link(&mut registry, root, mid);
    link(&mut registry, mid, tail);
    // Host pin
    registry.pin(root).unwrap();

    registry.collect(&[], trace, |_, _| {});

    assert!(registry.contains(root));
    assert!(registry.contains(mid));
    assert!(registry.contains(tail));
    assert!(!registry.contains(garbage));
    assert_eq!(registry.stats().last_marked, 3);
}

#[test]
fn test_cycle_reachable_from_pin_survives() {
    let mut registry = AllocationRegistry::new();
    let holder = registry.allocate(TestObject::leaf(0), 16).unwrap();
    let a = registry.allocate(TestObject::leaf(1), 16).unwrap();
    let b = registry.allocate(TestObject::leaf(2), 16).unwrap();
    link(&mut registry, a, b);
    link(&mut registry, b, a);
    link(&mut registry, holder, a);
    registry.pin(holder).unwrap();

    registry.collect(&[], trace, |_, _| {});
    assert_eq!(registry.allocation_count(), 3);

    // Drop the host pin: the whole structure becomes garbage
    registry.unpin(holder).unwrap();
    registry.collect(&[], trace, |_, _| {});
    assert_eq!(registry.allocation_count(), 0);
}

#[test]
fn test_caller_roots_keep_subgraph() {
    let mut registry = AllocationRegistry::new();
    let root = registry.allocate(TestObject::leaf(0), 16).unwrap();
    let child = registry.allocate(TestObject::leaf(1), 16).unwrap();
    link(&mut registry, root, child);

    registry.collect(&[root], trace, |_, _| {});
    assert!(registry.contains(root));
    assert!(registry.contains(child));
}

#[test]
fn test_stale_roots_and_edges_ignored() {
    let mut registry = AllocationRegistry::new();
    let gone = registry.allocate(TestObject::leaf(0), 16).unwrap();
    registry.free(gone).unwrap();
    let holder = registry.allocate(TestObject::leaf(1), 16).unwrap();
    registry.get_mut(holder).unwrap().references.push(gone);
    registry.pin(holder).unwrap();

    registry.collect(&[gone], trace, |_, _| {});
    assert!(registry.contains(holder));
    assert!(matches!(registry.free(gone), Err(GcError::StaleHandle(h)) if h == gone));
}

#[test]
fn test_two_step_sweep_allows_finalizer_access() {
    let mut registry = AllocationRegistry::new();
    let a = registry.allocate(TestObject::leaf(10), 16).unwrap();
    let b = registry.allocate(TestObject::leaf(20), 16).unwrap();
    link(&mut registry, a, b);

    let dead = registry.mark(&[], trace);
    assert_eq!(dead.len(), 2);

    // Free `a` first; `b` is still readable while finalizing `a`
    let first = registry.free(a).unwrap();
    assert_eq!(first.references, vec![b]);
    assert_eq!(registry.get(b).unwrap().value, 20);
    registry.unpin(b).unwrap();
    registry.free(b).unwrap();

    assert_eq!(registry.finish_cycle(), 32);
    assert_eq!(registry.stats().collection_count, 1);
    assert_eq!(registry.stats().last_freed, 2);
}

#[test]
fn test_stress_many_allocations() {
    let mut registry = AllocationRegistry::with_config(GcConfig::new().initial_slots(1024));
    let keep = registry.allocate(TestObject::leaf(-1), 8).unwrap();
    registry.pin(keep).unwrap();

    for round in 0..10 {
        for i in 0..500 {
            let handle = registry.allocate(TestObject::leaf(i), 8).unwrap();
            if i % 100 == 0 {
                link(&mut registry, keep, handle);
            }
        }
        registry.collect(&[], trace, |_, _| {});
        assert_eq!(registry.allocation_count(), 1 + 5 * (round + 1));
    }

    let stats = registry.stats();
    assert_eq!(stats.collection_count, 10);
    assert!(stats.total_pause_time >= stats.last_pause_time);
}

#[test]
fn test_slot_reuse_after_collection() {
    let mut registry = AllocationRegistry::new();
    let first = registry.allocate(TestObject::leaf(0), 16).unwrap();
    registry.collect(&[], trace, |_, _| {});

    let second = registry.allocate(TestObject::leaf(1), 16).unwrap();
    assert_eq!(second.index(), first.index());
    assert!(registry.get(first).is_err());
    assert_eq!(registry.get(second).unwrap().value, 1);
    assert_eq!(Handle::from_bits(second.to_bits()), second);
}
