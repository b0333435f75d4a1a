//! # bfalloc - A Best-Fit Boundary-Tag Allocator
//!
//! This crate provides a small `malloc`/`free` style allocator that manages a
//! single region of memory reserved from the OS once, with `mmap(2)`.
//!
//! ## Overview
//!
//! The region is carved into blocks that sit back to back. There is no
//! separate free list: every block starts with a one-word header holding its
//! size, so the next block is always `start + size`.
//!
//! ```text
//!   Region Layout:
//!
//!   ┌─────┬────────────┬──────┬──────────────────┬──────────┬─────┐
//!   │ pad │ A (alloc)  │ FREE │    B (alloc)     │   FREE   │ end │
//!   └─────┴────────────┴──────┴──────────────────┴──────────┴─────┘
//!    4 B    header+data  hdr..ftr                  hdr..ftr    4 B (value 1)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   bfalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Header word encoding
//!   ├── source     - Where region memory comes from (mmap, global allocator)
//!   ├── region     - Region lifecycle and bounds-checked word access
//!   ├── heap       - Heap type and best-fit allocation
//!   ├── reclaim    - Release and boundary-tag coalescing
//!   ├── inspect    - Block table, totals and invariant checks
//!   ├── config     - Environment configuration
//!   └── global     - Process-wide heap with C-style entry points
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use bfalloc::Heap;
//!
//! let mut heap = Heap::new();
//! heap.init(4096).unwrap();
//!
//! let ptr = heap.allocate(24).unwrap();
//! unsafe { ptr.as_ptr().cast::<u64>().write(42) };
//!
//! heap.release(ptr.as_ptr()).unwrap();
//! assert_eq!(heap.stats().blocks, 1);
//! ```
//!
//! ## How It Works
//!
//! Each block header packs the block size with two status bits:
//!
//! ```text
//!   Header word:
//!   ┌──────────────────────────────────────┬───┬───┐
//!   │        size (multiple of 8)          │ p │ a │
//!   └──────────────────────────────────────┴───┴───┘
//!     a: this block is allocated
//!     p: the previous block is allocated
//!
//!   Free block:
//!   ┌────────┬──────────────────────────────┬────────┐
//!   │ header │            unused            │ footer │ footer = size
//!   └────────┴──────────────────────────────┴────────┘
//! ```
//!
//! **Allocation** scans every block and picks the smallest free one that is
//! large enough (stopping early at an exact fit), then splits off whatever is
//! left over as a new free block.
//!
//! **Release** clears the allocated bit and merges the block with a free
//! successor (found through its header) and a free predecessor (found through
//! the footer just before this block's header).
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Fixed size**: The region never grows or shrinks
//! - **8-byte alignment**: Larger alignments are not supported
//! - **Unix-only**: Requires `libc` and `mmap` for the default source
//!
//! ## Logging
//!
//! Operations log through the `log` facade. Set `BFALLOC_ECHO=1` to print the
//! block table after every allocation and release.

pub mod align;
pub mod block;
mod config;
mod error;
pub mod global;
mod heap;
mod inspect;
mod reclaim;
mod region;
mod source;

#[cfg(test)]
mod testing;

pub use config::{Config, ECHO_ENV};
pub use error::{HeapError, Result};
pub use heap::Heap;
pub use inspect::{BlockInfo, Blocks, HeapStats};
pub use region::Region;
pub use source::{GlobalSource, MemorySource, MmapSource};
