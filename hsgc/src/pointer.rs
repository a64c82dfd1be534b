//! Handle to a tracked allocation
//!
//! `ObjectRef` is the payload address of a tracked object. It is what callers hold and what root
//! slots store. The heap maps it back to the object it names, no header sits in front of it.

use std::ptr::NonNull;

/// A handle to a tracked object.
///
/// This is a thin wrapper around the payload address. It does not keep the object alive: the
/// object is freed by the next collection unless a registered root slot holds this address.
#[repr(transparent)]
#[derive(PartialEq, Eq, Hash)]
pub struct ObjectRef {
    ptr: NonNull<u8>,
}

impl ObjectRef {
    /// Get the raw payload pointer
    #[inline]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Create from a raw pointer, returning `None` for null.
    ///
    /// The result is only a name for an address. Whether a tracked object lives there is decided by
    /// the heap when the handle is used.
    #[inline]
    pub fn from_ptr(ptr: *mut u8) -> Option<ObjectRef> {
        NonNull::new(ptr).map(ObjectRef::from_non_null)
    }

    /// Create from a NonNull pointer
    #[inline]
    pub const fn from_non_null(ptr: NonNull<u8>) -> ObjectRef {
        ObjectRef { ptr }
    }

    /// The payload address as an integer
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Cast the payload pointer to another type
    #[inline]
    pub fn cast<T>(&self) -> *mut T {
        self.ptr.cast::<T>().as_ptr()
    }
}

impl Clone for ObjectRef {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl Copy for ObjectRef {}

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectRef({:p})", self.ptr)
    }
}

impl std::fmt::Pointer for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Pointer::fmt(&self.ptr, f)
    }
}
