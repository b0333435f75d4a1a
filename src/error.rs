use std::io;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, HeapError>;

/// Errors returned by heap operations. A failed operation leaves the block
/// list untouched.
#[derive(Debug, Error)]
pub enum HeapError {
  #[error("heap has already been initialized")]
  AlreadyInitialized,

  #[error("heap has not been initialized")]
  Uninitialized,

  #[error("requested region size {requested} cannot hold a heap")]
  InvalidRegionSize { requested: usize },

  #[error("cannot reserve memory for the heap: {0}")]
  ReservationFailed(#[source] io::Error),

  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),

  #[error("address {addr:#x} is outside the heap")]
  OutOfBounds { addr: usize },

  #[error("block at {addr:#x} is already free")]
  DoubleRelease { addr: usize },

  #[error("no free block can hold {requested} bytes")]
  OutOfMemory { requested: usize },

  #[error("heap corrupted at offset {offset:#x}: {reason}")]
  Corrupted { offset: usize, reason: &'static str },
}
