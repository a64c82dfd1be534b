//! C ABI over a single process-wide heap
//!
//! The process-wide heap exists between `hsgc_init` and `hsgc_fini` and is never created lazily.
//! Every entry point holds one lock for its whole duration.
//!
//! Calls made while no heap exists: `hsgc_alloc` and `hsgc_register_root` would have to create
//! state and terminate the process instead, every other call does nothing.

use std::ffi::c_void;

use parking_lot::Mutex;

use crate::{error::fatal_alloc_error, Heap, HeapOptions, RootSlot};

static GLOBAL_HEAP: Mutex<Option<Heap>> = parking_lot::const_mutex(None);

fn not_initialized(operation: &str) -> ! {
    tracing::error!(target: "hsgc::gc", operation, "heap used before hsgc_init");
    eprintln!("hsgc: {operation} called before hsgc_init");
    std::process::exit(1);
}

/// Run `f` against the process-wide heap. Returns `None` if no heap has been initialized.
pub fn with_global_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
    GLOBAL_HEAP.lock().as_mut().map(f)
}

/// Whether the process-wide heap currently exists
pub fn is_initialized() -> bool {
    GLOBAL_HEAP.lock().is_some()
}

/// Create the process-wide heap with the given options. Does nothing if it already exists.
pub fn init_with_options(options: HeapOptions) {
    let mut global = GLOBAL_HEAP.lock();
    if global.is_some() {
        tracing::warn!(target: "hsgc::gc", "hsgc_init called twice, keeping existing heap");
        return;
    }

    *global = Some(Heap::with_options(options));
}

/// Create the process-wide heap. Does nothing if it already exists.
#[no_mangle]
pub extern "C" fn hsgc_init() {
    init_with_options(HeapOptions::default());
}

/// Allocate `size` zeroed bytes tracked by the collector. Never returns null: failure terminates
/// the process.
#[no_mangle]
pub extern "C" fn hsgc_alloc(size: usize) -> *mut c_void {
    let result = match GLOBAL_HEAP.lock().as_mut() {
        Some(heap) => heap.try_alloc(size),
        None => not_initialized("hsgc_alloc"),
    };

    match result {
        Ok(object) => object.cast::<c_void>(),
        Err(error) => fatal_alloc_error(&error),
    }
}

/// Mark an object so it survives the next collection. Null or untracked pointers are ignored.
#[no_mangle]
pub extern "C" fn hsgc_mark(object: *mut c_void) {
    if let Some(heap) = GLOBAL_HEAP.lock().as_mut() {
        heap.mark_raw(object.cast::<u8>());
    }
}

/// Run one mark-sweep cycle from the registered roots.
#[no_mangle]
pub extern "C" fn hsgc_collect() {
    if let Some(heap) = GLOBAL_HEAP.lock().as_mut() {
        heap.collect();
    }
}

/// Release every object and root record and destroy the process-wide heap, after a last
/// collection. `hsgc_init` may be called again afterwards.
#[no_mangle]
pub extern "C" fn hsgc_fini() {
    let heap = GLOBAL_HEAP.lock().take();
    if let Some(mut heap) = heap {
        heap.finalize();
    }
}

/// Register the address of a pointer variable as a root.
///
/// # Safety
/// `root` must stay valid for reads until it is unregistered or `hsgc_fini` is called.
#[no_mangle]
pub unsafe extern "C" fn hsgc_register_root(root: *mut *mut c_void) {
    let result = match GLOBAL_HEAP.lock().as_mut() {
        Some(heap) => heap.try_register_root(root as RootSlot),
        None => not_initialized("hsgc_register_root"),
    };

    if let Err(error) = result {
        fatal_alloc_error(&error);
    }
}

/// Unregister a root. Does nothing if `root` was never registered.
#[no_mangle]
pub extern "C" fn hsgc_unregister_root(root: *mut *mut c_void) {
    if let Some(heap) = GLOBAL_HEAP.lock().as_mut() {
        heap.unregister_root(root as RootSlot);
    }
}
