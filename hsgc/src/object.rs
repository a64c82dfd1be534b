//! Tracked objects
//!
//! Every block handed out by the heap is a `TrackedObject`: a zeroed payload buffer taken from the
//! native heap, plus a mark flag kept beside it. The store indexes objects by payload address, so
//! the mark flag never has to be found by stepping back from the payload.

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
    slice,
};

use crate::{
    error::{AllocError, AllocResult},
    ObjectRef,
};

/// Collector phase.
///
/// A collection moves Idle -> Marking -> Sweeping -> Idle without returning control to the caller
/// in between, so the heap is observed in `Idle` outside of `collect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcPhase {
    /// No collection in progress
    Idle,
    /// Flagging objects referenced by root slots
    Marking,
    /// Freeing unflagged objects and resetting flags on survivors
    Sweeping,
}

impl Default for GcPhase {
    fn default() -> Self {
        GcPhase::Idle
    }
}

/// A block owned by the object store
pub struct TrackedObject {
    /// Start of the payload, the address handed to the caller
    payload: NonNull<u8>,
    /// Size requested by the caller
    size: usize,
    /// Layout the payload was allocated with
    layout: Layout,
    /// Set by the mark phase, cleared by the sweep phase
    marked: bool,
}

impl TrackedObject {
    /// Alignment of every payload, matching what the platform allocator guarantees to C callers
    pub const ALIGN: usize = 16;

    /// Allocate a zeroed payload of `size` bytes from the native heap.
    pub(crate) fn new(size: usize) -> AllocResult<TrackedObject> {
        let layout = Self::layout_for_size(size)?;

        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let payload = NonNull::new(ptr).ok_or(AllocError::OutOfMemory { size })?;

        Ok(TrackedObject {
            payload,
            size,
            layout,
            marked: false,
        })
    }

    /// Get the layout for a payload of the given size.
    ///
    /// Zero sized requests still occupy one byte so that every object has a unique address.
    #[inline]
    pub fn layout_for_size(size: usize) -> AllocResult<Layout> {
        Layout::from_size_align(size.max(1), Self::ALIGN)
            .map(|layout| layout.pad_to_align())
            .map_err(|_| AllocError::InvalidLayout { size })
    }

    /// Handle naming this object
    #[inline]
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::from_non_null(self.payload)
    }

    /// Size requested by the caller
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.marked
    }

    #[inline]
    pub fn set_marked(&mut self, marked: bool) {
        self.marked = marked;
    }

    /// Payload bytes
    #[inline]
    pub fn payload(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.payload.as_ptr(), self.size) }
    }

    /// Mutable payload bytes
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.payload.as_ptr(), self.size) }
    }
}

impl Drop for TrackedObject {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.payload.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedObject")
            .field("payload", &self.payload)
            .field("size", &self.size)
            .field("marked", &self.marked)
            .finish()
    }
}
