use crate::{
  block::{ALIGNMENT, Header, WORD_SIZE},
  error::{HeapError, Result},
  heap::Heap,
  region::{HEAP_START, Span},
  source::MemorySource,
};

impl<S: MemorySource> Heap<S> {
  /// Frees the block whose payload starts at `ptr` and merges it with any
  /// free neighbours.
  ///
  /// Rejected pointers leave the heap untouched.
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    let span = self.region.span_mut()?;

    let (offset, header) = locate(span, ptr).inspect_err(|e| {
      log::warn!("release({:?}) rejected: {}", ptr, e);
    })?;

    let (offset, header) = coalesce(span, offset, header.with_allocated(false));
    log::debug!(
      "release({:?}): free block of {} bytes at offset {:#x}",
      ptr,
      header.size(),
      offset
    );

    self.echo();
    Ok(())
  }
}

/// Finds the allocated block owning the payload at `ptr`.
fn locate(
  span: &Span,
  ptr: *mut u8,
) -> Result<(usize, Header)> {
  if ptr.is_null() {
    return Err(HeapError::InvalidArgument("null pointer"));
  }

  let addr = ptr as usize;
  if addr % ALIGNMENT != 0 {
    return Err(HeapError::InvalidArgument("pointer is not 8-byte aligned"));
  }

  let offset = span
    .offset_of(addr)
    .filter(|&offset| offset >= HEAP_START + WORD_SIZE && offset < span.end())
    .ok_or(HeapError::OutOfBounds { addr })?
    - WORD_SIZE;

  let header = span
    .walk()
    .find(|&(o, _)| o >= offset)
    .filter(|&(o, _)| o == offset)
    .map(|(_, header)| header)
    .ok_or(HeapError::InvalidArgument("pointer does not start a block"))?;

  if header.is_free() {
    return Err(HeapError::DoubleRelease { addr });
  }

  Ok((offset, header))
}

/// Writes `header` (a block just marked free) back and merges it with the
/// free blocks on either side. Returns the resulting free block.
fn coalesce(
  span: &mut Span,
  offset: usize,
  mut header: Header,
) -> (usize, Header) {
  span.set_header(offset, header);
  span.set_footer(offset, header.size());

  let next = offset + header.size();
  match span.header(next) {
    Some(next_header) if next_header.is_free() => {
      header = header.with_size(header.size() + next_header.size());
      span.set_header(offset, header);
      span.set_footer(offset, header.size());
    }
    Some(next_header) => span.set_header(next, next_header.with_prev_allocated(false)),
    None => {}
  }

  if header.prev_allocated() {
    return (offset, header);
  }

  let prev_size = span.word(offset - WORD_SIZE) as usize;
  let prev_offset = offset - prev_size;
  match span.header(prev_offset) {
    Some(prev) if prev.is_free() && prev.size() == prev_size => {
      let merged = prev.with_size(prev_size + header.size());
      span.set_header(prev_offset, merged);
      span.set_footer(prev_offset, merged.size());
      (prev_offset, merged)
    }
    _ => {
      log::error!(
        "free block before offset {:#x} has a footer ({}) that does not match its header",
        offset,
        prev_size
      );
      (offset, header)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::ptr;

  use super::*;
  use crate::testing::{heap, shape};

  #[test]
  fn test_release_restores_single_block() {
    let mut heap = heap(512);

    let ptr = heap.allocate(24).unwrap();
    assert_eq!(shape(&heap), [(32, true), (472, false)]);

    heap.release(ptr.as_ptr()).unwrap();

    assert_eq!(shape(&heap), [(504, false)]);
    let span = heap.region.span().unwrap();
    assert_eq!(span.header(HEAP_START), Some(Header::free(504, true)));
    assert_eq!(span.footer(HEAP_START, 504), 504);
  }

  #[test]
  fn test_release_clears_next_prev_allocated() {
    let mut heap = heap(512);

    let a = heap.allocate(8).unwrap();
    heap.allocate(8).unwrap();

    heap.release(a.as_ptr()).unwrap();

    let span = heap.region.span().unwrap();
    assert_eq!(span.header(HEAP_START), Some(Header::free(16, true)));
    assert_eq!(span.footer(HEAP_START, 16), 16);
    assert_eq!(
      span.header(HEAP_START + 16),
      Some(Header::allocated(16, false))
    );
    heap.verify().unwrap();
  }

  #[test]
  fn test_coalesce_forward() {
    let mut heap = heap(512);

    let a = heap.allocate(12).unwrap();
    let b = heap.allocate(12).unwrap();
    heap.allocate(12).unwrap();

    heap.release(b.as_ptr()).unwrap();
    heap.release(a.as_ptr()).unwrap();

    assert_eq!(shape(&heap), [(32, false), (16, true), (456, false)]);
    heap.verify().unwrap();
  }

  #[test]
  fn test_coalesce_backward() {
    let mut heap = heap(512);

    let a = heap.allocate(12).unwrap();
    let b = heap.allocate(12).unwrap();
    heap.allocate(12).unwrap();

    heap.release(a.as_ptr()).unwrap();
    heap.release(b.as_ptr()).unwrap();

    assert_eq!(shape(&heap), [(32, false), (16, true), (456, false)]);
    let span = heap.region.span().unwrap();
    assert_eq!(span.header(HEAP_START), Some(Header::free(32, true)));
    heap.verify().unwrap();
  }

  #[test]
  fn test_coalesce_both_sides() {
    let mut heap = heap(512);

    let a = heap.allocate(12).unwrap();
    let b = heap.allocate(12).unwrap();
    let c = heap.allocate(12).unwrap();
    heap.allocate(12).unwrap();

    heap.release(a.as_ptr()).unwrap();
    heap.release(c.as_ptr()).unwrap();
    assert_eq!(
      shape(&heap),
      [(16, false), (16, true), (16, false), (16, true), (440, false)]
    );

    heap.release(b.as_ptr()).unwrap();

    assert_eq!(shape(&heap), [(48, false), (16, true), (440, false)]);
    heap.verify().unwrap();
  }

  #[test]
  fn test_release_last_block_merges_into_everything() {
    let mut heap = heap(512);

    let ptrs: Vec<_> = (0..4).map(|_| heap.allocate(60).unwrap()).collect();
    for ptr in ptrs.iter().rev() {
      heap.release(ptr.as_ptr()).unwrap();
      heap.verify().unwrap();
    }

    assert_eq!(shape(&heap), [(504, false)]);
  }

  #[test]
  fn test_reject_null_and_misaligned() {
    let mut heap = heap(512);
    let ptr = heap.allocate(24).unwrap();
    let before = shape(&heap);

    assert!(matches!(
      heap.release(ptr::null_mut()),
      Err(HeapError::InvalidArgument(_))
    ));
    assert!(matches!(
      heap.release(unsafe { ptr.as_ptr().add(4) }),
      Err(HeapError::InvalidArgument(_))
    ));

    assert_eq!(shape(&heap), before);
  }

  #[test]
  fn test_reject_out_of_bounds() {
    let mut heap = heap(512);
    let ptr = heap.allocate(24).unwrap();
    let before = shape(&heap);
    let base = heap.region.span().unwrap().addr(0);

    for addr in [base - 8, base, base + 512, base + 4096] {
      assert!(
        matches!(
          heap.release(addr as *mut u8),
          Err(HeapError::OutOfBounds { .. })
        ),
        "{addr:#x}"
      );
    }

    let mut outside = [0u64; 2];
    assert!(matches!(
      heap.release(outside.as_mut_ptr().cast()),
      Err(HeapError::OutOfBounds { .. })
    ));

    assert_eq!(shape(&heap), before);
    heap.release(ptr.as_ptr()).unwrap();
  }

  #[test]
  fn test_reject_pointer_inside_payload() {
    let mut heap = heap(512);
    let ptr = heap.allocate(64).unwrap();
    let before = shape(&heap);

    assert!(matches!(
      heap.release(unsafe { ptr.as_ptr().add(8) }),
      Err(HeapError::InvalidArgument(_))
    ));

    assert_eq!(shape(&heap), before);
  }

  #[test]
  fn test_double_release() {
    let mut heap = heap(512);
    let a = heap.allocate(24).unwrap();
    heap.allocate(24).unwrap();

    heap.release(a.as_ptr()).unwrap();
    let after_first = shape(&heap);

    assert!(matches!(
      heap.release(a.as_ptr()),
      Err(HeapError::DoubleRelease { .. })
    ));
    assert_eq!(shape(&heap), after_first);
    heap.verify().unwrap();
  }

  #[test]
  fn test_release_on_uninitialized_heap() {
    let mut heap = crate::Heap::with_source(crate::GlobalSource::new(8));
    let mut word = 0u64;

    assert!(matches!(
      heap.release((&mut word as *mut u64).cast()),
      Err(HeapError::Uninitialized)
    ));
  }
}
