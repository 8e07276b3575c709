//! GC Integration Tests
//!
//! Collector behavior through the runtime API:
//! - Cycle collection and pin rooting
//! - Argument-stack roots
//! - Automatic collection and the heap limit
//! - Stale handles and shutdown

use std::cell::RefCell;
use std::rc::Rc;

use keel_core::{
    DestructContext, ObjectRef, Runtime, RuntimeConfig, StatusKind, TypeBehavior, TypeRef, Value,
};

/// Records the objects it destructs
struct Tracked {
    destructed: Rc<RefCell<Vec<ObjectRef>>>,
}

impl TypeBehavior for Tracked {
    fn destruct(&self, cx: &mut DestructContext<'_>) {
        self.destructed.borrow_mut().push(cx.object());
    }
}

/// Leaves two locked `spawn` objects behind when destructed
struct Spawner {
    spawn: TypeRef,
}

impl TypeBehavior for Spawner {
    fn destruct(&self, cx: &mut DestructContext<'_>) {
        for _ in 0..2 {
            let rt = cx.runtime();
            if let Ok(object) = rt.allocate_with(self.spawn, &[]) {
                let _ = rt.lock(object);
            }
        }
    }
}

fn setup(config: RuntimeConfig) -> (Runtime, TypeRef, Rc<RefCell<Vec<ObjectRef>>>) {
    let mut rt = Runtime::with_config(config);
    let destructed = Rc::new(RefCell::new(Vec::new()));
    let node = rt
        .register_type(
            "Node",
            None,
            8,
            Rc::new(Tracked {
                destructed: Rc::clone(&destructed),
            }),
        )
        .unwrap();
    (rt, node, destructed)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("keel=trace")
        .try_init();
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn test_unpinned_cycle_reclaimed() {
    init_tracing();
    let (mut rt, node, destructed) = setup(RuntimeConfig::default());
    let a = rt.allocate_with(node, &[]).unwrap();
    let b = rt.allocate_with(node, &[]).unwrap();
    rt.store(a, 0, Value::Object(b)).unwrap();
    rt.store(b, 0, Value::Object(a)).unwrap();
    assert_eq!(rt.pins(a).unwrap(), 1);
    assert_eq!(rt.pins(b).unwrap(), 1);

    let reclaimed = rt.collect().unwrap();

    assert!(reclaimed > 0);
    assert!(!rt.is_live(a));
    assert!(!rt.is_live(b));
    assert_eq!(rt.live_objects(), 0);
    let mut dead = destructed.borrow().clone();
    dead.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(dead, expected);
    // Objects no longer pin their type
    assert_eq!(rt.type_pins(node).unwrap(), 0);
}

#[test]
fn test_cycle_reachable_from_lock_survives() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let a = rt.allocate_with(node, &[]).unwrap();
    let b = rt.allocate_with(node, &[]).unwrap();
    let c = rt.allocate_with(node, &[]).unwrap();
    rt.store(a, 0, Value::Object(b)).unwrap();
    rt.store(b, 0, Value::Object(c)).unwrap();
    rt.store(c, 0, Value::Object(a)).unwrap();
    rt.lock(b).unwrap();

    rt.collect().unwrap();
    assert_eq!(rt.live_objects(), 3);

    rt.unlock(b).unwrap();
    rt.collect().unwrap();
    assert_eq!(rt.live_objects(), 0);
}

#[test]
fn test_store_replaces_pin() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let holder = rt.allocate_with(node, &[]).unwrap();
    let first = rt.allocate_with(node, &[]).unwrap();
    let second = rt.allocate_with(node, &[]).unwrap();
    rt.lock(holder).unwrap();

    rt.store(holder, 2, Value::Object(first)).unwrap();
    assert!(rt.load(holder, 0).unwrap().is_void());
    rt.store(holder, 2, Value::Object(second)).unwrap();
    assert_eq!(rt.pins(first).unwrap(), 0);
    assert_eq!(rt.pins(second).unwrap(), 1);

    rt.collect().unwrap();
    assert!(!rt.is_live(first));
    assert!(rt.is_live(second));
    assert_eq!(rt.load(holder, 2).unwrap().as_object(), Some(second));
}

#[test]
fn test_edges_report_type_and_fields() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let a = rt.allocate_with(node, &[]).unwrap();
    let b = rt.allocate_with(node, &[]).unwrap();
    let object_type = rt.lookup_type("Object").unwrap();
    rt.store(a, 0, Value::Object(b)).unwrap();
    rt.store(a, 1, Value::Type(object_type)).unwrap();
    rt.store(a, 2, Value::Int32(7)).unwrap();

    let edges = rt.edges(a).unwrap();
    assert_eq!(edges.objects, vec![b]);
    assert_eq!(edges.types, vec![node, object_type]);
}

// ============================================================================
// Roots
// ============================================================================

#[test]
fn test_argument_stack_roots() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let a = rt.allocate_with(node, &[]).unwrap();
    let b = rt.allocate_with(node, &[]).unwrap();
    rt.push(Value::Object(a)).unwrap();

    rt.collect().unwrap();
    assert!(rt.is_live(a));
    assert!(!rt.is_live(b));

    rt.arguments_mut().truncate(0);
    rt.collect().unwrap();
    assert!(!rt.is_live(a));
}

#[test]
fn test_stored_type_pins() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let kind = rt
        .register_type("Kind", None, 0, Rc::new(Tracked {
            destructed: Rc::new(RefCell::new(Vec::new())),
        }))
        .unwrap();
    let holder = rt.allocate_with(node, &[]).unwrap();

    rt.store(holder, 0, Value::Type(kind)).unwrap();
    assert_eq!(rt.type_pins(kind).unwrap(), 1);
    assert_eq!(
        rt.unregister_type("Kind").unwrap_err().kind(),
        StatusKind::InvalidState
    );

    // Collecting the holder releases the stored type
    rt.collect().unwrap();
    assert_eq!(rt.type_pins(kind).unwrap(), 0);
    rt.unregister_type("Kind").unwrap();
}

// ============================================================================
// Limits and automatic collection
// ============================================================================

#[test]
fn test_auto_collect_before_allocation() {
    let config = RuntimeConfig::new().auto_collect(true).gc_threshold(1);
    let (mut rt, node, _) = setup(config);

    let garbage = rt.allocate_with(node, &[]).unwrap();
    assert!(rt.should_collect());
    let kept = rt.allocate_with(node, &[]).unwrap();

    assert!(!rt.is_live(garbage));
    assert!(rt.is_live(kept));
    assert_eq!(rt.gc_stats().collection_count, 1);
    assert_eq!(rt.live_objects(), 1);
}

#[test]
fn test_heap_limit() {
    let config = RuntimeConfig::new().heap_limit(64);
    let (mut rt, node, _) = setup(config);
    rt.push(Value::Int32(1)).unwrap();

    rt.allocate_with(node, &[]).unwrap();
    let err = rt.allocate_with(node, &[]).unwrap_err();

    assert_eq!(err.kind(), StatusKind::AllocationFailed);
    assert_eq!(rt.live_objects(), 1);
    assert_eq!(rt.arguments().depth(), 1);
}

#[test]
fn test_size_overflow() {
    let mut rt = Runtime::new();
    let huge = rt
        .register_type("Huge", None, usize::MAX, Rc::new(Tracked {
            destructed: Rc::new(RefCell::new(Vec::new())),
        }))
        .unwrap();
    let err = rt.allocate_with(huge, &[]).unwrap_err();
    assert_eq!(err.kind(), StatusKind::AllocationFailed);
    assert_eq!(rt.live_objects(), 0);
    assert_eq!(rt.type_pins(rt.types().core().raw_memory).unwrap(), 0);
}

#[test]
fn test_stats_track_collections() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    for _ in 0..10 {
        rt.allocate_with(node, &[]).unwrap();
    }
    let before = rt.gc_stats();
    assert_eq!(before.allocation_count, 10);

    let reclaimed = rt.collect().unwrap();
    let after = rt.gc_stats();
    assert_eq!(after.collection_count, before.collection_count + 1);
    assert_eq!(after.last_reclaimed, reclaimed);
    assert_eq!(after.total_bytes, 0);
}

// ============================================================================
// Stale handles and shutdown
// ============================================================================

#[test]
fn test_stale_handle_not_exists() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let gone = rt.allocate_with(node, &[]).unwrap();
    rt.collect().unwrap();
    // Reuses the freed slot
    let fresh = rt.allocate_with(node, &[]).unwrap();
    assert_ne!(gone, fresh);

    assert_eq!(rt.lock(gone).unwrap_err().kind(), StatusKind::NotExists);
    assert_eq!(rt.data(gone).unwrap_err().kind(), StatusKind::NotExists);
    assert_eq!(
        rt.equals(&Value::Object(gone), &Value::Int32(0))
            .unwrap_err()
            .kind(),
        StatusKind::NotExists
    );
    assert!(rt.is_live(fresh));
}

#[test]
fn test_dispose() {
    let (mut rt, node, destructed) = setup(RuntimeConfig::default());
    let a = rt.allocate_with(node, &[]).unwrap();
    rt.lock(a).unwrap();
    assert_eq!(rt.dispose(a).unwrap_err().kind(), StatusKind::InvalidState);

    rt.unlock(a).unwrap();
    rt.dispose(a).unwrap();
    assert!(!rt.is_live(a));
    assert_eq!(destructed.borrow().as_slice(), &[a]);
}

#[test]
fn test_shutdown_finalizes_everything() {
    init_tracing();
    let (mut rt, node, destructed) = setup(RuntimeConfig::default());
    let pinned = rt.allocate_with(node, &[]).unwrap();
    let _garbage = rt.allocate_with(node, &[]).unwrap();
    rt.lock(pinned).unwrap();
    rt.push(Value::Object(pinned)).unwrap();

    let report = rt.shutdown().unwrap();

    assert_eq!(report.collected, 1);
    assert_eq!(report.still_pinned, 1);
    assert_eq!(report.types_removed, 1);
    assert_eq!(destructed.borrow().len(), 2);
    assert_eq!(rt.live_objects(), 0);
    assert!(rt.arguments().is_empty());
    assert_eq!(
        rt.lookup_type("Node").unwrap_err().kind(),
        StatusKind::NotExists
    );
    assert!(rt.lookup_type("Object").is_ok());
    assert_eq!(rt.types().epoch(), 1);
}

#[test]
fn test_destructor_allocations_survive_collection() {
    let (mut rt, node, destructed) = setup(RuntimeConfig::default());
    let spawner = rt
        .register_type("Spawner", None, 0, Rc::new(Spawner { spawn: node }))
        .unwrap();
    let object = rt.allocate_with(spawner, &[]).unwrap();

    rt.collect().unwrap();

    assert!(!rt.is_live(object));
    assert_eq!(rt.gc_stats().last_freed, 1);
    assert_eq!(rt.live_objects(), 2);
    assert!(destructed.borrow().is_empty());
}

#[test]
fn test_shutdown_counts_destructor_allocations() {
    init_tracing();
    let (mut rt, node, destructed) = setup(RuntimeConfig::default());
    let spawner = rt
        .register_type("Spawner", None, 0, Rc::new(Spawner { spawn: node }))
        .unwrap();
    rt.allocate_with(spawner, &[]).unwrap();

    let report = rt.shutdown().unwrap();

    assert_eq!(report.collected, 1);
    assert_eq!(report.still_pinned, 0);
    assert_eq!(report.allocated_by_destructors, 2);
    assert_eq!(report.types_removed, 2);
    assert_eq!(destructed.borrow().len(), 2);
    assert_eq!(rt.live_objects(), 0);
}

// ============================================================================
// Field storage
// ============================================================================

#[test]
fn test_store_index_overflow() {
    let (mut rt, node, _) = setup(RuntimeConfig::default());
    let object = rt.allocate_with(node, &[]).unwrap();
    let target = rt.allocate_with(node, &[]).unwrap();

    assert_eq!(
        rt.store(object, usize::MAX, Value::Int32(1)).unwrap_err().kind(),
        StatusKind::AllocationFailed
    );
    assert_eq!(
        rt.store(object, usize::MAX / 2, Value::Object(target))
            .unwrap_err()
            .kind(),
        StatusKind::AllocationFailed
    );

    // A failed store leaves the value unpinned and the fields untouched
    assert_eq!(rt.pins(target).unwrap(), 0);
    assert!(matches!(rt.load(object, 0).unwrap(), Value::Void));

    rt.store(object, 3, Value::Object(target)).unwrap();
    assert_eq!(rt.pins(target).unwrap(), 1);
    assert!(matches!(rt.load(object, 2).unwrap(), Value::Void));
}
