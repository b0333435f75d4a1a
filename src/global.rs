//! A process-wide heap with C-style entry points.
//!
//! The heap lives in a static and is initialized once with [`init`]. Nothing
//! here synchronizes: callers must never enter these functions from more than
//! one thread at a time.

use std::{cell::UnsafeCell, ptr};

use crate::{config::Config, error::Result, heap::Heap};

struct HeapHolder(UnsafeCell<Heap>);

unsafe impl Sync for HeapHolder {}

static HEAP: HeapHolder = HeapHolder(UnsafeCell::new(Heap::new()));

unsafe fn heap() -> &'static mut Heap {
  unsafe { &mut *HEAP.0.get() }
}

/// Reserves the process heap. Configuration is read from the environment on
/// the first successful call.
///
/// # Safety
///
/// No other function of this module may run concurrently.
pub unsafe fn init(
  size: usize,
) -> Result<()> {
  let heap = unsafe { heap() };
  if !heap.is_ready() {
    heap.set_config(Config::from_env());
  }
  heap.init(size)
}

/// Allocates `size` bytes from the process heap. Returns null on failure.
///
/// # Safety
///
/// No other function of this module may run concurrently.
pub unsafe fn allocate(
  size: usize,
) -> *mut u8 {
  match unsafe { heap() }.try_allocate(size) {
    Ok(ptr) => ptr.as_ptr(),
    Err(e) => {
      log::debug!("allocate({}) failed: {}", size, e);
      ptr::null_mut()
    }
  }
}

/// Returns a block to the process heap.
///
/// # Safety
///
/// No other function of this module may run concurrently.
pub unsafe fn release(
  ptr: *mut u8,
) -> Result<()> {
  unsafe { heap() }.release(ptr)
}

/// Prints the process heap's block table to stdout.
///
/// # Safety
///
/// No other function of this module may run concurrently.
pub unsafe fn dump() {
  unsafe { heap() }.dump();
}

/// Runs `f` with shared access to the process heap.
///
/// # Safety
///
/// No other function of this module may run concurrently.
pub unsafe fn with_heap<R>(
  f: impl FnOnce(&Heap) -> R,
) -> R {
  f(unsafe { heap() })
}
