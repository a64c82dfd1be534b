//! Heap - the collector context
//!
//! Design:
//! - Uses the native allocator for payloads, each tracked by the object store
//! - Maintains a registry of root slots owned by the caller
//! - Collection is explicit, there is no allocation threshold or timer
//! - Marking is shallow: only objects whose address is currently held by a root survive, payload
//!   contents are never scanned for further references
//!
//! The caller provides:
//! - Root slots, through `register_root`
//! - Optionally extra roots, through a `RootSource` passed to `collect_with_roots`

use crate::{
    error::{fatal_alloc_error, AllocError, AllocResult},
    object::GcPhase,
    options::HeapOptions,
    roots::{RootRegistry, RootSlot},
    store::ObjectStore,
    visitor::{RootSource, RootVisitor},
    ObjectRef,
};

/// Statistics for one collection cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Objects flagged by the mark phase (not counting objects that were already marked)
    pub objects_marked: usize,
    /// Objects freed by the sweep phase
    pub objects_freed: usize,
    /// Payload bytes freed by the sweep phase
    pub bytes_freed: usize,
    /// Objects left in the store after the sweep
    pub objects_surviving: usize,
}

/// Statistics for a finalize call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FinalizeStats {
    /// The last regular collection
    pub collection: CollectionStats,
    /// Survivors of that collection, released regardless of marks
    pub objects_released: usize,
    pub bytes_released: usize,
    /// Root records dropped
    pub roots_released: usize,
}

/// Snapshot of the heap's size
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub num_objects: usize,
    pub bytes_allocated: usize,
    pub num_roots: usize,
    /// Number of completed collection cycles
    pub collections: usize,
}

/// The managed heap
pub struct Heap {
    /// All live tracked objects
    store: ObjectStore,

    /// All registered root slots
    roots: RootRegistry,

    options: HeapOptions,

    /// Current GC phase
    phase: GcPhase,

    /// Number of completed collection cycles
    collections: usize,
}

// SAFETY: Payloads are owned by the heap alone and root slots are only read while the heap is
// being used through `&mut self`. The process-wide heap in `ffi` is only reached through a mutex.
unsafe impl Send for Heap {}

impl Heap {
    /// Create a new heap with default options
    pub fn new() -> Heap {
        Self::with_options(HeapOptions::default())
    }

    pub fn with_options(options: HeapOptions) -> Heap {
        Heap {
            store: ObjectStore::new(),
            roots: RootRegistry::new(),
            options,
            phase: GcPhase::Idle,
            collections: 0,
        }
    }

    /// Get current GC phase
    #[inline]
    pub fn phase(&self) -> GcPhase {
        self.phase
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate `size` zeroed bytes, reporting failure to the caller.
    ///
    /// The new object is unmarked and will be freed by the next collection unless a root points at
    /// it by then.
    pub fn try_alloc(&mut self, size: usize) -> AllocResult<ObjectRef> {
        if let Some(limit) = self.options.heap_limit {
            let allocated = self.store.bytes_allocated();
            if allocated.saturating_add(size) > limit {
                return Err(AllocError::HeapLimitExceeded {
                    requested: size,
                    limit,
                    allocated,
                });
            }
        }

        self.store.allocate(size)
    }

    /// Allocate `size` zeroed bytes. Terminates the process if the allocation cannot be satisfied.
    pub fn alloc(&mut self, size: usize) -> ObjectRef {
        match self.try_alloc(size) {
            Ok(object) => object,
            Err(error) => fatal_alloc_error(&error),
        }
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// Register a root slot, reporting failure to the caller.
    ///
    /// Null slots are ignored. Registering a slot twice creates two independent records.
    ///
    /// # Safety
    /// `slot` must stay valid for reads until it is unregistered or the heap is finalized.
    pub unsafe fn try_register_root(&mut self, slot: RootSlot) -> AllocResult<()> {
        if self.roots.register(slot)? {
            tracing::trace!(target: "hsgc::gc", ?slot, "registered root");
        } else {
            tracing::warn!(target: "hsgc::gc", "ignoring null root slot");
        }

        Ok(())
    }

    /// Register a root slot. Terminates the process if the record cannot be allocated.
    ///
    /// # Safety
    /// `slot` must stay valid for reads until it is unregistered or the heap is finalized.
    pub unsafe fn register_root(&mut self, slot: RootSlot) {
        if let Err(error) = self.try_register_root(slot) {
            fatal_alloc_error(&error);
        }
    }

    /// Unregister the most recently registered record for `slot`.
    ///
    /// Returns whether a record was removed. Unregistering an unknown slot does nothing.
    pub fn unregister_root(&mut self, slot: RootSlot) -> bool {
        let removed = self.roots.unregister(slot);
        if removed {
            tracing::trace!(target: "hsgc::gc", ?slot, "unregistered root");
        }

        removed
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Mark an object so that it survives the next sweep.
    ///
    /// Marking is idempotent. Returns false if `object` is not a live tracked object.
    pub fn mark(&mut self, object: ObjectRef) -> bool {
        self.mark_raw(object.as_ptr())
    }

    /// Mark the object whose payload starts at `addr`. Null and untracked addresses are ignored.
    pub fn mark_raw(&mut self, addr: *mut u8) -> bool {
        match self.store.lookup_raw(addr) {
            Some(object) => {
                object.set_marked(true);
                true
            }
            None => false,
        }
    }

    /// Run one full mark-sweep cycle from the registered roots.
    pub fn collect(&mut self) -> CollectionStats {
        self.collect_with_roots(&mut NoExtraRoots)
    }

    /// Run one full mark-sweep cycle from the registered roots and the roots reported by `extra`.
    pub fn collect_with_roots(
        &mut self,
        extra: &mut (impl RootSource + ?Sized),
    ) -> CollectionStats {
        tracing::debug!(
            target: "hsgc::gc",
            roots = self.roots.len(),
            objects = self.store.len(),
            bytes = self.store.bytes_allocated(),
            "GC cycle starting"
        );

        self.phase = GcPhase::Marking;
        let objects_marked = {
            let mut marker = Marker::new(&mut self.store);
            self.roots.visit_roots(&mut marker);
            extra.visit_roots(&mut marker);
            marker.objects_marked()
        };

        self.phase = GcPhase::Sweeping;
        let released = self.store.sweep();

        self.phase = GcPhase::Idle;
        self.collections += 1;

        let stats = CollectionStats {
            objects_marked,
            objects_freed: released.objects,
            bytes_freed: released.bytes,
            objects_surviving: self.store.len(),
        };

        if self.options.log_collections {
            tracing::info!(
                target: "hsgc::gc",
                collection = self.collections,
                marked = stats.objects_marked,
                freed_objects = stats.objects_freed,
                freed_bytes = stats.bytes_freed,
                live_objects = stats.objects_surviving,
                live_bytes = self.store.bytes_allocated(),
                "GC cycle complete"
            );
        } else {
            tracing::debug!(
                target: "hsgc::gc",
                freed_objects = stats.objects_freed,
                live_objects = stats.objects_surviving,
                "GC cycle complete"
            );
        }

        stats
    }

    /// Run a last collection, then release every remaining object and root record.
    ///
    /// Calling this on an empty heap does nothing. The heap is empty afterwards and may be used
    /// again.
    pub fn finalize(&mut self) -> FinalizeStats {
        let collection = self.collect();

        let released = self.store.clear();
        let roots_released = self.roots.clear();

        tracing::debug!(
            target: "hsgc::gc",
            objects = released.objects,
            roots = roots_released,
            "heap finalized"
        );

        FinalizeStats {
            collection,
            objects_released: released.objects,
            bytes_released: released.bytes,
            roots_released,
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Get number of objects currently allocated
    #[inline]
    pub fn num_objects(&self) -> usize {
        self.store.len()
    }

    /// Get payload bytes currently allocated
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.store.bytes_allocated()
    }

    /// Get number of registered root records
    #[inline]
    pub fn num_roots(&self) -> usize {
        self.roots.len()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            num_objects: self.store.len(),
            bytes_allocated: self.store.bytes_allocated(),
            num_roots: self.roots.len(),
            collections: self.collections,
        }
    }

    /// Whether `object` is still a live tracked object
    #[inline]
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.store.contains(object)
    }

    /// Mark state of a live object, `None` if it is not tracked
    #[inline]
    pub fn is_marked(&self, object: ObjectRef) -> Option<bool> {
        self.store.get(object).map(|object| object.is_marked())
    }

    /// Whether `slot` is currently registered
    #[inline]
    pub fn is_root(&self, slot: RootSlot) -> bool {
        self.roots.contains(slot)
    }

    /// Payload bytes of a live object
    #[inline]
    pub fn payload(&self, object: ObjectRef) -> Option<&[u8]> {
        self.store.get(object).map(|object| object.payload())
    }

    /// Mutable payload bytes of a live object
    #[inline]
    pub fn payload_mut(&mut self, object: ObjectRef) -> Option<&mut [u8]> {
        self.store.get_mut(object).map(|object| object.payload_mut())
    }

    /// The object store, for inspection
    #[inline]
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// The root registry, for inspection
    #[inline]
    pub fn roots(&self) -> &RootRegistry {
        &self.roots
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("phase", &self.phase)
            .field("stats", &self.stats())
            .finish()
    }
}

struct NoExtraRoots;

impl RootSource for NoExtraRoots {
    fn visit_roots(&mut self, _visitor: &mut impl RootVisitor) {}
}

// ============================================================================
// Marker - implements RootVisitor for the marking phase
// ============================================================================

/// A marker that implements `RootVisitor` for use during the mark phase.
///
/// Root values that are the payload address of a live object flag that object. Anything else is
/// ignored, and flagged objects are never scanned for further references.
pub struct Marker<'a> {
    store: &'a mut ObjectStore,
    objects_marked: usize,
}

impl<'a> Marker<'a> {
    pub fn new(store: &'a mut ObjectStore) -> Self {
        Marker {
            store,
            objects_marked: 0,
        }
    }

    /// Objects flagged by this marker that were not already flagged
    pub fn objects_marked(&self) -> usize {
        self.objects_marked
    }
}

impl<'a> RootVisitor for Marker<'a> {
    fn visit_raw(&mut self, value: *mut u8) {
        if let Some(object) = self.store.lookup_raw(value) {
            if !object.is_marked() {
                object.set_marked(true);
                self.objects_marked += 1;
            }
        }
    }
}
