//! HSGC - a root-based mark-sweep memory manager
//!
//! Blocks handed out by the heap stay alive for as long as a registered root slot points at them.
//! Collection is explicit and shallow: only objects whose payload address is currently stored in a
//! root slot survive, payload contents are never scanned.
//!
//! Key types:
//! - `Heap`: The collector context, owning the object store and the root registry
//! - `ObjectRef`: Opaque handle to a tracked allocation (its payload address)
//! - `ObjectStore`: All live tracked allocations
//! - `RootRegistry`: All registered root slots
//!
//! Key traits:
//! - `RootVisitor`: Implemented by the marker, receives the current value of every root
//! - `RootSource`: Implemented by hosts that want to report roots without registering slots
//!
//! The `ffi` module exposes a single process-wide heap through a C ABI.

mod error;
pub mod ffi;
mod heap;
mod object;
mod options;
mod pointer;
mod roots;
mod store;
mod visitor;

pub use error::{fatal_alloc_error, AllocError, AllocResult};
pub use heap::{CollectionStats, FinalizeStats, Heap, HeapStats, Marker};
pub use object::{GcPhase, TrackedObject};
pub use options::{HeapOptions, HeapOptionsBuilder};
pub use pointer::ObjectRef;
pub use roots::{RootRecord, RootRegistry, RootSlot};
pub use store::ObjectStore;
pub use visitor::{RootSource, RootVisitor};

#[cfg(test)]
mod tests;
