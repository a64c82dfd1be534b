//! Root visitor and root source traits
//!
//! These traits keep the marker decoupled from where roots live.
//! - `RootVisitor`: Implemented by the collector's `Marker`, receives root values
//! - `RootSource`: Implemented by hosts that hold roots outside of registered slots

use crate::ObjectRef;

/// Root visitor trait - implemented by the collector's marking logic
///
/// Root sources call this once per root with the value currently stored there.
pub trait RootVisitor {
    /// Visit the current value of a root.
    ///
    /// The value may be null or an address the heap does not track, both are ignored.
    fn visit_raw(&mut self, value: *mut u8);

    /// Visit a root known to hold a handle
    #[inline]
    fn visit(&mut self, object: ObjectRef) {
        self.visit_raw(object.as_ptr());
    }
}

/// Root source trait - implemented by hosts that hold roots outside of registered slots
///
/// # Example
/// ```ignore
/// impl RootSource for Interpreter {
///     fn visit_roots(&mut self, visitor: &mut impl RootVisitor) {
///         for value in &self.stack {
///             visitor.visit(*value);
///         }
///         if let Some(accumulator) = self.accumulator {
///             visitor.visit(accumulator);
///         }
///     }
/// }
/// ```
pub trait RootSource {
    /// Report every root held by this source
    fn visit_roots(&mut self, visitor: &mut impl RootVisitor);
}

impl RootSource for [ObjectRef] {
    fn visit_roots(&mut self, visitor: &mut impl RootVisitor) {
        for object in self.iter() {
            visitor.visit(*object);
        }
    }
}

impl RootSource for Vec<ObjectRef> {
    fn visit_roots(&mut self, visitor: &mut impl RootVisitor) {
        self.as_mut_slice().visit_roots(visitor);
    }
}
