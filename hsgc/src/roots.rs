//! Root registry
//!
//! A root is the address of a pointer-sized variable owned by the caller. The registry never owns
//! or writes that variable: at mark time it reads whatever the variable currently holds.

use std::ptr::NonNull;

use crate::{
    error::{AllocError, AllocResult},
    visitor::RootVisitor,
};

/// Address of an external variable holding a payload address (or null)
pub type RootSlot = *mut *mut u8;

/// A registered root slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootRecord {
    slot: NonNull<*mut u8>,
}

impl RootRecord {
    /// The registered slot address
    #[inline]
    pub fn slot(&self) -> RootSlot {
        self.slot.as_ptr()
    }

    /// Read the value currently stored in the slot.
    ///
    /// # Safety
    /// The slot must still be readable, as promised when it was registered.
    #[inline]
    pub unsafe fn read(&self) -> *mut u8 {
        self.slot.as_ptr().read()
    }
}

/// All registered root slots, in registration order
#[derive(Debug, Default)]
pub struct RootRegistry {
    records: Vec<RootRecord>,
}

impl RootRegistry {
    /// Create a new empty registry
    pub const fn new() -> RootRegistry {
        RootRegistry {
            records: Vec::new(),
        }
    }

    /// Register a root slot. Registering the same slot twice creates two records.
    ///
    /// Returns `Ok(false)` without registering anything if `slot` is null.
    ///
    /// # Safety
    /// `slot` must stay valid for reads until it is unregistered or the registry is cleared.
    pub unsafe fn register(&mut self, slot: RootSlot) -> AllocResult<bool> {
        let slot = match NonNull::new(slot) {
            Some(slot) => slot,
            None => return Ok(false),
        };

        self.records
            .try_reserve(1)
            .map_err(|_| AllocError::OutOfMemory {
                size: std::mem::size_of::<RootRecord>(),
            })?;
        self.records.push(RootRecord { slot });

        Ok(true)
    }

    /// Remove the most recently registered record for `slot`. Returns whether one was found.
    pub fn unregister(&mut self, slot: RootSlot) -> bool {
        match self.records.iter().rposition(|record| record.slot() == slot) {
            Some(index) => {
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether `slot` has at least one record
    #[inline]
    pub fn contains(&self, slot: RootSlot) -> bool {
        self.records.iter().any(|record| record.slot() == slot)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    /// Report the current value of every slot, most recently registered first.
    pub fn visit_roots(&self, visitor: &mut impl RootVisitor) {
        for record in self.records.iter().rev() {
            // Registration promised the slot stays readable while registered
            let value = unsafe { record.read() };
            visitor.visit_raw(value);
        }
    }
}
