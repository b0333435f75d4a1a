//! The single memory region a heap manages.
//!
//! ```text
//!   offset 0    4                                          len-4   len
//!          ┌────┬──────────┬──────────┬─────────┬──────────┬────┐
//!          │pad │  block   │  block   │   ...   │  block   │ 1  │
//!          └────┴──────────┴──────────┴─────────┴──────────┴────┘
//!               ▲                                          ▲
//!               first header (payloads land 8-aligned)     end sentinel
//! ```
//!
//! Blocks are addressed by their byte offset from the start of the mapping.
//! The next block always lives at `offset + size`.

use std::{io, ptr::NonNull};

use crate::{
  align::round_up,
  block::{ALIGNMENT, END_MARK, Header, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, WORD_SIZE},
  error::{HeapError, Result},
  source::{MemorySource, MmapSource},
};

/// Offset of the first block header.
pub const HEAP_START: usize = WORD_SIZE;

/// Bytes of every mapping not available to blocks: the leading pad and the
/// end sentinel.
pub const RESERVED: usize = 2 * WORD_SIZE;

enum State {
  Uninitialized,
  Ready(Span),
}

/// A region moves from uninitialized to ready exactly once.
pub struct Region<S: MemorySource = MmapSource> {
  source: S,
  state: State,
}

impl Region<MmapSource> {
  pub const fn new() -> Self {
    Self::with_source(MmapSource)
  }
}

impl Default for Region<MmapSource> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: MemorySource> Region<S> {
  pub const fn with_source(
    source: S,
  ) -> Self {
    Self {
      source,
      state: State::Uninitialized,
    }
  }

  /// Reserves `requested` bytes (rounded up to the page size) and lays out a
  /// single free block over the whole usable span.
  ///
  /// A failed call leaves the region uninitialized.
  pub fn init(
    &mut self,
    requested: usize,
  ) -> Result<()> {
    if self.is_ready() {
      log::error!("region has been initialized by a previous call");
      return Err(HeapError::AlreadyInitialized);
    }

    if requested == 0 {
      log::error!("requested region size is not positive");
      return Err(HeapError::InvalidRegionSize { requested });
    }

    let alloc_size = round_up(requested, self.source.page_size())
      .filter(|&len| {
        len % ALIGNMENT == 0 && len >= RESERVED + MIN_BLOCK_SIZE && len - RESERVED <= MAX_BLOCK_SIZE
      })
      .ok_or_else(|| {
        log::error!("requested region size {} cannot be laid out", requested);
        HeapError::InvalidRegionSize { requested }
      })?;

    let base = self.source.reserve(alloc_size).map_err(|e| {
      log::error!("cannot reserve {} bytes: {}", alloc_size, e);
      HeapError::ReservationFailed(e)
    })?;

    if base.as_ptr() as usize % ALIGNMENT != 0 {
      unsafe { self.source.release(base, alloc_size) };
      log::error!("reserved memory at {:?} is not {}-byte aligned", base, ALIGNMENT);
      return Err(HeapError::ReservationFailed(io::Error::new(
        io::ErrorKind::InvalidData,
        "reserved memory is not 8-byte aligned",
      )));
    }

    let mut span = Span {
      base,
      len: alloc_size,
    };
    let usable = span.usable();
    span.set_header(HEAP_START, Header::free(usable, true));
    span.set_footer(HEAP_START, usable);
    span.set_word(span.end(), END_MARK);

    log::debug!(
      "region ready: {} bytes at {:?}, {} usable",
      alloc_size,
      base,
      usable
    );

    self.state = State::Ready(span);
    Ok(())
  }

  pub fn is_ready(
    &self,
  ) -> bool {
    matches!(self.state, State::Ready(_))
  }

  /// Length of the mapping, once initialized.
  pub fn alloc_size(
    &self,
  ) -> Option<usize> {
    self.span().ok().map(Span::len)
  }

  pub(crate) fn span(
    &self,
  ) -> Result<&Span> {
    match &self.state {
      State::Ready(span) => Ok(span),
      State::Uninitialized => Err(HeapError::Uninitialized),
    }
  }

  pub(crate) fn span_mut(
    &mut self,
  ) -> Result<&mut Span> {
    match &mut self.state {
      State::Ready(span) => Ok(span),
      State::Uninitialized => Err(HeapError::Uninitialized),
    }
  }
}

impl<S: MemorySource> Drop for Region<S> {
  fn drop(
    &mut self,
  ) {
    if let State::Ready(span) = &self.state {
      unsafe { self.source.release(span.base, span.len) };
    }
  }
}

/// A reserved mapping, accessed word by word through bounds-checked offsets.
pub(crate) struct Span {
  base: NonNull<u8>,
  len: usize,
}

impl Span {
  pub fn len(
    &self,
  ) -> usize {
    self.len
  }

  /// Bytes available to blocks.
  pub fn usable(
    &self,
  ) -> usize {
    self.len - RESERVED
  }

  /// Offset of the end sentinel.
  pub fn end(
    &self,
  ) -> usize {
    self.len - WORD_SIZE
  }

  pub fn addr(
    &self,
    offset: usize,
  ) -> usize {
    self.base.as_ptr() as usize + offset
  }

  /// Offset of `addr` within the mapping, if it lies inside it.
  pub fn offset_of(
    &self,
    addr: usize,
  ) -> Option<usize> {
    addr
      .checked_sub(self.base.as_ptr() as usize)
      .filter(|&offset| offset < self.len)
  }

  /// Payload address of the block whose header is at `offset`.
  pub fn payload(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    self.check(offset + WORD_SIZE);
    unsafe { self.base.add(offset + WORD_SIZE) }
  }

  pub fn word(
    &self,
    offset: usize,
  ) -> u32 {
    self.check(offset);
    unsafe { self.base.add(offset).cast::<u32>().read() }
  }

  pub fn set_word(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    self.check(offset);
    unsafe { self.base.add(offset).cast::<u32>().write(value) }
  }

  /// Header at `offset`, or `None` at the end sentinel.
  pub fn header(
    &self,
    offset: usize,
  ) -> Option<Header> {
    Header::decode(self.word(offset))
  }

  pub fn set_header(
    &mut self,
    offset: usize,
    header: Header,
  ) {
    self.set_word(offset, header.encode());
  }

  /// Footer of the block at `offset` spanning `size` bytes.
  pub fn footer(
    &self,
    offset: usize,
    size: usize,
  ) -> usize {
    self.word(offset + size - WORD_SIZE) as usize
  }

  pub fn set_footer(
    &mut self,
    offset: usize,
    size: usize,
  ) {
    self.set_word(offset + size - WORD_SIZE, size as u32);
  }

  /// Blocks in address order, from the first header to the end sentinel.
  pub fn walk(
    &self,
  ) -> Walk<'_> {
    Walk {
      span: self,
      offset: HEAP_START,
    }
  }

  fn check(
    &self,
    offset: usize,
  ) {
    assert!(
      offset % WORD_SIZE == 0 && offset <= self.len - WORD_SIZE,
      "word offset {offset:#x} outside region of {} bytes",
      self.len
    );
  }
}

/// Iterator over `(offset, header)` pairs of a span.
///
/// Stops early at a header whose size would not advance the walk or would
/// cross the sentinel.
pub(crate) struct Walk<'a> {
  span: &'a Span,
  offset: usize,
}

impl Iterator for Walk<'_> {
  type Item = (usize, Header);

  fn next(
    &mut self,
  ) -> Option<Self::Item> {
    let offset = self.offset;
    let header = self.span.header(offset)?;

    if header.size() == 0 || offset + header.size() > self.span.end() {
      log::error!("malformed block header {:#x} at offset {:#x}", header.encode(), offset);
      self.offset = self.span.end();
      return None;
    }

    self.offset += header.size();
    Some((offset, header))
  }
}
