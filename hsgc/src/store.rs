//! Object store - owns every live tracked allocation
//!
//! Objects are indexed by payload address. Iteration order is unspecified and nothing depends on
//! it: marking and sweeping give the same result in any order.

use hashbrown::HashMap;

use crate::{
    error::{AllocError, AllocResult},
    object::TrackedObject,
    ObjectRef,
};

/// Objects and bytes released by one pass over the store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Released {
    pub objects: usize,
    pub bytes: usize,
}

/// All live tracked objects
#[derive(Default)]
pub struct ObjectStore {
    objects: HashMap<ObjectRef, TrackedObject>,

    /// Sum of the requested payload sizes of all live objects
    bytes_allocated: usize,
}

impl ObjectStore {
    /// Create a new empty store
    pub fn new() -> ObjectStore {
        ObjectStore {
            objects: HashMap::new(),
            bytes_allocated: 0,
        }
    }

    /// Allocate a new unmarked object of `size` payload bytes.
    ///
    /// The object is visible to the next collection as soon as this returns.
    pub fn allocate(&mut self, size: usize) -> AllocResult<ObjectRef> {
        self.objects
            .try_reserve(1)
            .map_err(|_| AllocError::OutOfMemory { size })?;

        let object = TrackedObject::new(size)?;
        let object_ref = object.object_ref();

        self.objects.insert(object_ref, object);
        self.bytes_allocated += size;

        Ok(object_ref)
    }

    /// Number of live objects
    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Sum of the requested payload sizes of all live objects
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    #[inline]
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.objects.contains_key(&object)
    }

    #[inline]
    pub fn get(&self, object: ObjectRef) -> Option<&TrackedObject> {
        self.objects.get(&object)
    }

    #[inline]
    pub fn get_mut(&mut self, object: ObjectRef) -> Option<&mut TrackedObject> {
        self.objects.get_mut(&object)
    }

    /// Look up the object whose payload starts at `addr`.
    ///
    /// Null and addresses that are not the start of a live payload yield `None`.
    #[inline]
    pub fn lookup_raw(&mut self, addr: *mut u8) -> Option<&mut TrackedObject> {
        let object = ObjectRef::from_ptr(addr)?;
        self.objects.get_mut(&object)
    }

    /// Free every unmarked object and reset the mark on every survivor.
    pub(crate) fn sweep(&mut self) -> Released {
        let mut released = Released::default();

        self.objects.retain(|_, object| {
            if object.is_marked() {
                // Live object - reset for next cycle
                object.set_marked(false);
                true
            } else {
                // Dead object - dropping it frees the payload
                released.objects += 1;
                released.bytes += object.size();
                false
            }
        });

        self.bytes_allocated -= released.bytes;

        released
    }

    /// Free every object regardless of mark state.
    pub(crate) fn clear(&mut self) -> Released {
        let released = Released {
            objects: self.objects.len(),
            bytes: self.bytes_allocated,
        };

        self.objects.clear();
        self.bytes_allocated = 0;

        released
    }
}
