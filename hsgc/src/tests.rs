//! GC Tests
//!
//! Tests for the collection scenarios the heap has to get exactly right: which objects survive a
//! sweep, and that nothing survives finalize.

use std::ptr;

use proptest::prelude::*;

use crate::{
    AllocError, GcPhase, Heap, HeapOptionsBuilder, ObjectRef, RootSlot, RootSource, RootVisitor,
};

/// A pointer variable living outside the heap, like a local or global in the host program
struct Slot {
    ptr: RootSlot,
}

impl Slot {
    fn new(object: Option<ObjectRef>) -> Slot {
        let value = object.map_or(ptr::null_mut(), |object| object.as_ptr());
        Slot {
            ptr: Box::into_raw(Box::new(value)),
        }
    }

    fn root(&self) -> RootSlot {
        self.ptr
    }

    fn set(&self, object: Option<ObjectRef>) {
        let value = object.map_or(ptr::null_mut(), |object| object.as_ptr());
        unsafe { self.ptr.write(value) }
    }

    fn set_raw(&self, value: *mut u8) {
        unsafe { self.ptr.write(value) }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        unsafe { drop(Box::from_raw(self.ptr)) }
    }
}

fn register(heap: &mut Heap, slot: &Slot) {
    unsafe { heap.register_root(slot.root()) }
}

/// Host-side roots that are not registered slots
struct TestContext {
    roots: Vec<ObjectRef>,
}

impl RootSource for TestContext {
    fn visit_roots(&mut self, visitor: &mut impl RootVisitor) {
        for root in &self.roots {
            visitor.visit(*root);
        }
    }
}

// ============================================================================
// Basic allocation and collection tests
// ============================================================================

#[test]
fn test_basic_alloc() {
    let mut heap = Heap::new();

    let object = heap.alloc(100);

    assert_eq!(heap.num_objects(), 1);
    assert_eq!(heap.bytes_allocated(), 100);
    assert_eq!(heap.payload(object).unwrap().len(), 100);
    assert_eq!(heap.is_marked(object), Some(false));
}

#[test]
fn test_multiple_allocs_are_distinct() {
    let mut heap = Heap::new();

    let objects: Vec<ObjectRef> = (0..100).map(|i| heap.alloc(i)).collect();

    assert_eq!(heap.num_objects(), 100);
    for (i, a) in objects.iter().enumerate() {
        for b in &objects[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_collect_unreachable() {
    let mut heap = Heap::new();

    for i in 0..10 {
        heap.alloc(i * 8);
    }

    // GC with no roots - everything should be collected
    let stats = heap.collect();

    assert_eq!(stats.objects_marked, 0);
    assert_eq!(stats.objects_freed, 10);
    assert_eq!(stats.bytes_freed, 360);
    assert_eq!(stats.objects_surviving, 0);
    assert_eq!(heap.num_objects(), 0);
    assert_eq!(heap.bytes_allocated(), 0);
}

#[test]
fn test_collect_rooted() {
    let mut heap = Heap::new();

    let root = heap.alloc(64);
    heap.payload_mut(root).unwrap()[0] = 42;

    for _ in 0..10 {
        heap.alloc(64);
    }

    let slot = Slot::new(Some(root));
    register(&mut heap, &slot);

    let stats = heap.collect();

    assert_eq!(stats.objects_marked, 1);
    assert_eq!(stats.objects_freed, 10);
    assert_eq!(heap.num_objects(), 1);
    assert_eq!(heap.payload(root).unwrap()[0], 42);
    assert_eq!(heap.phase(), GcPhase::Idle);
}

// ============================================================================
// Marking
// ============================================================================

#[test]
fn test_mark_is_idempotent() {
    let mut heap = Heap::new();
    let object = heap.alloc(16);

    assert!(heap.mark(object));
    assert_eq!(heap.is_marked(object), Some(true));
    assert!(heap.mark(object));
    assert_eq!(heap.is_marked(object), Some(true));

    // Marked once or twice, the object survives exactly one sweep
    assert_eq!(heap.collect().objects_freed, 0);
    assert_eq!(heap.is_marked(object), Some(false));
    assert_eq!(heap.collect().objects_freed, 1);
}

#[test]
fn test_mark_ignores_untracked_addresses() {
    let mut heap = Heap::new();
    let object = heap.alloc(32);

    let mut local = 0u8;
    assert!(!heap.mark_raw(&mut local));
    assert!(!heap.mark_raw(ptr::null_mut()));
    assert!(!heap.mark_raw(unsafe { object.as_ptr().add(1) }));

    assert_eq!(heap.is_marked(object), Some(false));
}

#[test]
fn test_same_object_from_many_roots() {
    let mut heap = Heap::new();
    let object = heap.alloc(8);

    let slots: Vec<Slot> = (0..5).map(|_| Slot::new(Some(object))).collect();
    for slot in &slots {
        register(&mut heap, slot);
    }

    let stats = heap.collect();
    assert_eq!(stats.objects_marked, 1);
    assert_eq!(stats.objects_surviving, 1);
    assert_eq!(heap.is_marked(object), Some(false));

    heap.finalize();
}

#[test]
fn test_root_values_outside_heap_are_ignored() {
    let mut heap = Heap::new();
    let object = heap.alloc(8);

    let mut local = 0u8;
    let stack_slot = Slot::new(None);
    stack_slot.set_raw(&mut local);
    let null_slot = Slot::new(None);
    let interior_slot = Slot::new(None);
    interior_slot.set_raw(unsafe { object.as_ptr().add(4) });

    register(&mut heap, &stack_slot);
    register(&mut heap, &null_slot);
    register(&mut heap, &interior_slot);

    let stats = heap.collect();
    assert_eq!(stats.objects_marked, 0);
    assert_eq!(heap.num_objects(), 0);

    heap.finalize();
}

#[test]
fn test_root_is_read_at_collection_time() {
    let mut heap = Heap::new();
    let a = heap.alloc(8);
    let b = heap.alloc(8);

    let slot = Slot::new(Some(a));
    register(&mut heap, &slot);

    // Retarget the slot after registration
    slot.set(Some(b));
    heap.collect();

    assert!(!heap.contains(a));
    assert!(heap.contains(b));

    slot.set(None);
    heap.collect();
    assert_eq!(heap.num_objects(), 0);
    assert_eq!(heap.num_roots(), 1);

    heap.finalize();
}

// ============================================================================
// Shallow marking
// ============================================================================

#[test]
fn test_reference_inside_payload_does_not_keep_object_alive() {
    let mut heap = Heap::new();

    let a = heap.alloc(std::mem::size_of::<usize>());
    let b = heap.alloc(16);

    // A's payload holds B's address, no root points at B
    heap.payload_mut(a)
        .unwrap()
        .copy_from_slice(&b.addr().to_ne_bytes());

    let slot = Slot::new(Some(a));
    register(&mut heap, &slot);

    let stats = heap.collect();

    assert_eq!(stats.objects_freed, 1);
    assert!(heap.contains(a));
    assert!(!heap.contains(b));

    heap.finalize();
}

#[test]
fn test_chain_keeps_only_head() {
    let mut heap = Heap::new();

    let word = std::mem::size_of::<usize>();
    let chain: Vec<ObjectRef> = (0..10).map(|_| heap.alloc(word)).collect();
    for pair in chain.windows(2) {
        heap.payload_mut(pair[0])
            .unwrap()
            .copy_from_slice(&pair[1].addr().to_ne_bytes());
    }

    let slot = Slot::new(Some(chain[0]));
    register(&mut heap, &slot);

    heap.collect();
    assert_eq!(heap.num_objects(), 1);
    assert!(heap.contains(chain[0]));

    heap.finalize();
}

// ============================================================================
// Roots
// ============================================================================

#[test]
fn test_unregister_then_collect_releases() {
    let mut heap = Heap::new();
    let object = heap.alloc(24);

    let slot = Slot::new(Some(object));
    register(&mut heap, &slot);

    heap.collect();
    assert!(heap.contains(object));

    assert!(heap.unregister_root(slot.root()));
    heap.collect();
    assert!(!heap.contains(object));
}

#[test]
fn test_unregister_twice_is_noop() {
    let mut heap = Heap::new();
    let slot = Slot::new(None);
    let never_registered = Slot::new(None);

    register(&mut heap, &slot);
    assert!(heap.unregister_root(slot.root()));
    assert!(!heap.unregister_root(slot.root()));
    assert!(!heap.unregister_root(never_registered.root()));

    assert_eq!(heap.num_roots(), 0);
}

#[test]
fn test_double_registration_needs_double_unregistration() {
    let mut heap = Heap::new();
    let object = heap.alloc(8);

    let slot = Slot::new(Some(object));
    register(&mut heap, &slot);
    register(&mut heap, &slot);
    assert_eq!(heap.num_roots(), 2);

    heap.unregister_root(slot.root());
    heap.collect();
    assert!(heap.contains(object));

    heap.unregister_root(slot.root());
    heap.collect();
    assert!(!heap.contains(object));
}

#[test]
fn test_null_slot_is_not_registered() {
    let mut heap = Heap::new();
    unsafe { heap.register_root(ptr::null_mut()) };
    assert_eq!(heap.num_roots(), 0);
}

#[test]
fn test_extra_root_source() {
    let mut heap = Heap::new();

    let a = heap.alloc(8);
    let b = heap.alloc(8);
    let c = heap.alloc(8);

    let slot = Slot::new(Some(a));
    register(&mut heap, &slot);

    let mut ctx = TestContext { roots: vec![b] };
    let stats = heap.collect_with_roots(&mut ctx);

    assert_eq!(stats.objects_marked, 2);
    assert!(heap.contains(a));
    assert!(heap.contains(b));
    assert!(!heap.contains(c));

    // Slices and vectors of handles are root sources too
    let stats = heap.collect_with_roots(&mut vec![b]);
    assert_eq!(stats.objects_surviving, 2);
    let mut none: Vec<ObjectRef> = Vec::new();
    let stats = heap.collect_with_roots(&mut none[..]);
    assert_eq!(stats.objects_surviving, 1);

    heap.finalize();
}

// ============================================================================
// Finalize
// ============================================================================

#[test]
fn test_scenario_collect_then_finalize() {
    let mut heap = Heap::new();

    let a = heap.alloc(100);
    let slot = Slot::new(Some(a));
    register(&mut heap, &slot);
    let b = heap.alloc(50);

    let stats = heap.collect();
    assert_eq!(stats.objects_freed, 1);
    assert_eq!(stats.bytes_freed, 50);
    assert!(heap.contains(a));
    assert!(!heap.contains(b));
    assert_eq!(heap.is_marked(a), Some(false));
    assert_eq!(heap.payload(a).unwrap().len(), 100);

    let stats = heap.finalize();
    assert_eq!(stats.collection.objects_freed, 0);
    assert_eq!(stats.objects_released, 1);
    assert_eq!(stats.bytes_released, 100);
    assert_eq!(stats.roots_released, 1);

    assert!(!heap.contains(a));
    assert!(!heap.is_root(slot.root()));
    assert!(heap.store().is_empty());
    assert!(heap.roots().is_empty());
}

#[test]
fn test_finalize_ignores_marks() {
    let mut heap = Heap::new();

    let objects: Vec<ObjectRef> = (0..4).map(|_| heap.alloc(8)).collect();
    let slots: Vec<Slot> = objects.iter().map(|object| Slot::new(Some(*object))).collect();
    for slot in &slots {
        register(&mut heap, slot);
    }
    for object in &objects {
        heap.mark(*object);
    }

    heap.finalize();

    assert_eq!(heap.stats().num_objects, 0);
    assert_eq!(heap.stats().num_roots, 0);
    assert_eq!(heap.bytes_allocated(), 0);
}

#[test]
fn test_finalize_empty_heap_is_noop() {
    let mut heap = Heap::new();

    let stats = heap.finalize();
    assert_eq!(stats.objects_released, 0);
    assert_eq!(stats.roots_released, 0);

    let stats = heap.finalize();
    assert_eq!(stats.objects_released, 0);
    assert_eq!(heap.num_objects(), 0);
}

// ============================================================================
// Options and failures
// ============================================================================

#[test]
fn test_heap_limit() {
    let mut heap = Heap::with_options(HeapOptionsBuilder::new().heap_limit(Some(100)).build());

    let first = heap.try_alloc(60).unwrap();
    assert_eq!(
        heap.try_alloc(60),
        Err(AllocError::HeapLimitExceeded {
            requested: 60,
            limit: 100,
            allocated: 60,
        })
    );

    // A failed allocation leaves nothing behind
    assert_eq!(heap.num_objects(), 1);

    // Collecting the first object makes room again
    heap.collect();
    assert!(!heap.contains(first));
    assert!(heap.try_alloc(100).is_ok());
}

#[test]
fn test_oversized_request_fails() {
    let mut heap = Heap::new();
    assert_eq!(
        heap.try_alloc(usize::MAX),
        Err(AllocError::InvalidLayout { size: usize::MAX })
    );
    assert_eq!(heap.num_objects(), 0);
}

#[test]
fn test_zero_size_allocations() {
    let mut heap = Heap::new();

    let a = heap.alloc(0);
    let b = heap.alloc(0);

    assert_ne!(a, b);
    assert_eq!(heap.payload(a).unwrap().len(), 0);
    assert_eq!(heap.bytes_allocated(), 0);
    assert_eq!(heap.collect().objects_freed, 2);
}

#[test]
fn test_stats_track_collections() {
    let mut heap = Heap::new();
    let slot = Slot::new(None);
    register(&mut heap, &slot);

    heap.alloc(10);
    heap.collect();
    heap.collect();

    let stats = heap.stats();
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.num_roots, 1);
    assert_eq!(stats.num_objects, 0);

    heap.finalize();
}

// ============================================================================
// Stress tests
// ============================================================================

#[test]
fn test_gc_stress_alloc_collect() {
    let mut heap = Heap::new();

    for round in 0..10 {
        let mut slots = Vec::new();

        for i in 0..100 {
            let object = heap.alloc(32);
            if i % 10 == 0 {
                let slot = Slot::new(Some(object));
                register(&mut heap, &slot);
                slots.push(slot);
            }
        }

        let stats = heap.collect();
        assert_eq!(
            heap.num_objects(),
            slots.len(),
            "Round {}: expected {} survivors",
            round,
            slots.len()
        );
        assert_eq!(stats.objects_freed, 90);

        for slot in &slots {
            heap.unregister_root(slot.root());
        }
        heap.collect();
        assert_eq!(heap.num_objects(), 0, "Round {}: roots released", round);
    }
}

proptest! {
    #[test]
    fn prop_exactly_rooted_objects_survive(
        objects in prop::collection::vec((0usize..256, any::<bool>()), 0..64),
    ) {
        let mut heap = Heap::new();
        let mut slots = Vec::new();
        let mut rooted = Vec::new();
        let mut unrooted = Vec::new();

        for (size, is_rooted) in objects {
            let object = heap.alloc(size);
            if is_rooted {
                let slot = Slot::new(Some(object));
                register(&mut heap, &slot);
                slots.push(slot);
                rooted.push(object);
            } else {
                unrooted.push(object);
            }
        }

        let stats = heap.collect();

        prop_assert_eq!(stats.objects_surviving, rooted.len());
        prop_assert_eq!(stats.objects_freed, unrooted.len());
        for object in &rooted {
            prop_assert_eq!(heap.is_marked(*object), Some(false));
        }

        let stats = heap.finalize();
        prop_assert_eq!(stats.objects_released, rooted.len());
        prop_assert_eq!(heap.num_objects(), 0);
        prop_assert_eq!(heap.num_roots(), 0);
    }
}
