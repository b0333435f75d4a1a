use std::{
  io::{self, Write},
  ptr::NonNull,
};

use crate::{
  align,
  block::{ALIGNMENT, Header, MIN_BLOCK_SIZE, WORD_SIZE},
  config::Config,
  error::{HeapError, Result},
  region::{Region, Span},
  source::{MemorySource, MmapSource},
};

/// A best-fit heap over a single region.
///
/// Not thread-safe: a heap must only be used from one thread at a time.
pub struct Heap<S: MemorySource = MmapSource> {
  pub(crate) region: Region<S>,
  config: Config,
}

impl Heap<MmapSource> {
  /// Creates an uninitialized heap backed by `mmap(2)`.
  pub const fn new() -> Self {
    Self::with_source(MmapSource)
  }
}

impl Default for Heap<MmapSource> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: MemorySource> Heap<S> {
  pub const fn with_source(
    source: S,
  ) -> Self {
    Self {
      region: Region::with_source(source),
      config: Config::new(),
    }
  }

  pub fn with_config(
    mut self,
    config: Config,
  ) -> Self {
    self.config = config;
    self
  }

  pub fn config(
    &self,
  ) -> Config {
    self.config
  }

  pub fn set_config(
    &mut self,
    config: Config,
  ) {
    self.config = config;
  }

  /// Reserves the region. See [`Region::init`].
  pub fn init(
    &mut self,
    size: usize,
  ) -> Result<()> {
    self.region.init(size)
  }

  pub fn is_ready(
    &self,
  ) -> bool {
    self.region.is_ready()
  }

  pub fn region(
    &self,
  ) -> &Region<S> {
    &self.region
  }

  /// Allocates at least `size` bytes, returning an 8-byte aligned payload.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    self.try_allocate(size).ok()
  }

  /// Like [`Heap::allocate`], but says why an allocation failed.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>> {
    if size < 1 {
      return Err(HeapError::InvalidArgument("allocation size must be positive"));
    }

    let span = self.region.span_mut()?;

    let Some(needed) = size
      .checked_add(WORD_SIZE)
      .filter(|&n| n <= span.usable())
      .map(|n| align!(n))
    else {
      log::debug!("allocate({}): larger than the whole region", size);
      return Err(HeapError::OutOfMemory { requested: size });
    };

    let Some((offset, header)) = best_fit(span, needed) else {
      log::debug!("allocate({}): no free block of {} bytes", size, needed);
      return Err(HeapError::OutOfMemory { requested: size });
    };

    place(span, offset, header, needed);
    let payload = span.payload(offset);

    log::debug!(
      "allocate({}) -> {:?}: {} byte block at offset {:#x} (from {} free)",
      size,
      payload,
      needed,
      offset,
      header.size()
    );
    debug_assert_eq!(payload.as_ptr() as usize % ALIGNMENT, 0);

    self.echo();
    Ok(payload)
  }

  pub(crate) fn echo(
    &self,
  ) {
    if self.config.echo_table {
      self.echo_into(&mut io::stdout().lock());
    }
  }

  /// Writes the block table to `out` when `echo_table` is set.
  pub(crate) fn echo_into<W: Write>(
    &self,
    out: &mut W,
  ) {
    if !self.config.echo_table {
      return;
    }
    if let Err(e) = self.write_table(out) {
      log::warn!("cannot write heap table: {}", e);
    }
  }
}

/// Smallest free block of at least `needed` bytes. An exact fit ends the scan;
/// among larger blocks the lowest address wins a tie.
fn best_fit(
  span: &Span,
  needed: usize,
) -> Option<(usize, Header)> {
  let mut best: Option<(usize, Header)> = None;

  for (offset, header) in span.walk() {
    if header.is_allocated() || header.size() < needed {
      continue;
    }

    if header.size() == needed {
      log::trace!("exact fit at offset {:#x}", offset);
      return Some((offset, header));
    }

    if best.is_none_or(|(_, b)| header.size() < b.size()) {
      log::trace!("best fit so far: {} bytes at offset {:#x}", header.size(), offset);
      best = Some((offset, header));
    }
  }

  best
}

/// Marks the free block at `offset` allocated, splitting off the tail when it
/// can stand as a block of its own.
fn place(
  span: &mut Span,
  offset: usize,
  header: Header,
  needed: usize,
) {
  let remainder = header.size() - needed;

  if remainder >= MIN_BLOCK_SIZE {
    span.set_header(offset, header.with_size(needed).with_allocated(true));

    let rest = offset + needed;
    span.set_header(rest, Header::free(remainder, true));
    span.set_footer(rest, remainder);
    return;
  }

  span.set_header(offset, header.with_allocated(true));

  let next = offset + header.size();
  if let Some(next_header) = span.header(next) {
    span.set_header(next, next_header.with_prev_allocated(true));
  }
}
