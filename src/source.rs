//! Where region memory comes from.

use std::{
  alloc::{self, Layout},
  io,
  ptr::{self, NonNull},
};

use crate::block::ALIGNMENT;

/// A provider of zero-filled, read/write, private memory.
///
/// The heap asks its source for memory exactly once and gives it back when
/// the region is dropped.
pub trait MemorySource {
  /// Granularity that reservation sizes are rounded up to.
  fn page_size(
    &self,
  ) -> usize;

  /// Reserves `len` zeroed bytes, aligned to at least 8 bytes.
  ///
  /// `len` is a non-zero multiple of [`MemorySource::page_size`].
  fn reserve(
    &mut self,
    len: usize,
  ) -> io::Result<NonNull<u8>>;

  /// Returns memory obtained from [`MemorySource::reserve`].
  ///
  /// # Safety
  ///
  /// `ptr` and `len` must come from a single earlier `reserve` call on this
  /// source, and the memory must not be used afterwards.
  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
    len: usize,
  );
}

/// Anonymous private mappings from `mmap(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmapSource;

impl MemorySource for MmapSource {
  fn page_size(
    &self,
  ) -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
      n if n > 0 => n as usize,
      _ => 4096,
    }
  }

  fn reserve(
    &mut self,
    len: usize,
  ) -> io::Result<NonNull<u8>> {
    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    NonNull::new(addr.cast::<u8>())
      .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
  }

  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
    len: usize,
  ) {
    if unsafe { libc::munmap(ptr.as_ptr().cast(), len) } != 0 {
      log::warn!("munmap({:?}, {}) failed: {}", ptr, len, io::Error::last_os_error());
    }
  }
}

/// Zeroed memory from the Rust global allocator, rounded to a caller-chosen
/// granule instead of the OS page size.
///
/// Useful where `mmap` is unavailable and for building regions of an exact
/// size.
#[derive(Clone, Copy, Debug)]
pub struct GlobalSource {
  granule: usize,
}

impl GlobalSource {
  /// Creates a source rounding reservations to `granule` bytes.
  ///
  /// # Panics
  ///
  /// Panics if `granule` is zero or not a multiple of 8.
  pub fn new(
    granule: usize,
  ) -> Self {
    assert!(
      granule != 0 && granule % ALIGNMENT == 0,
      "granule must be a non-zero multiple of {ALIGNMENT}"
    );
    Self { granule }
  }

  fn layout(
    len: usize,
  ) -> io::Result<Layout> {
    Layout::from_size_align(len, ALIGNMENT)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
  }
}

impl MemorySource for GlobalSource {
  fn page_size(
    &self,
  ) -> usize {
    self.granule
  }

  fn reserve(
    &mut self,
    len: usize,
  ) -> io::Result<NonNull<u8>> {
    let layout = Self::layout(len)?;
    if layout.size() == 0 {
      return Err(io::Error::from(io::ErrorKind::InvalidInput));
    }

    NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
      .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
  }

  unsafe fn release(
    &mut self,
    ptr: NonNull<u8>,
    len: usize,
  ) {
    if let Ok(layout) = Self::layout(len) {
      unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
  }
}
