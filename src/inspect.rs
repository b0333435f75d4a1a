//! Read-only views of the block list.

use std::io::{self, Write};

use crate::{
  block::{ALIGNMENT, Header},
  error::{HeapError, Result},
  heap::Heap,
  region::{HEAP_START, Walk},
  source::MemorySource,
};

/// One block as seen by a walk over the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// 1-based position in address order.
  pub index: usize,
  /// Offset of the header from the start of the mapping.
  pub offset: usize,
  /// Address of the first byte (the header).
  pub begin: usize,
  /// Address of the last byte.
  pub end: usize,
  /// Block size, header included.
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
}

/// Totals over every block of a heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub used: usize,
  pub free: usize,
  pub largest_free: usize,
}

/// Iterator returned by [`Heap::blocks`].
pub struct Blocks<'a> {
  walk: Option<(Walk<'a>, usize)>,
  index: usize,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(
    &mut self,
  ) -> Option<Self::Item> {
    let (walk, base) = self.walk.as_mut()?;
    let (offset, header) = walk.next()?;
    self.index += 1;

    Some(BlockInfo {
      index: self.index,
      offset,
      begin: *base + offset,
      end: *base + offset + header.size() - 1,
      size: header.size(),
      allocated: header.is_allocated(),
      prev_allocated: header.prev_allocated(),
    })
  }
}

impl<S: MemorySource> Heap<S> {
  /// Blocks in address order. Empty for an uninitialized heap.
  pub fn blocks(
    &self,
  ) -> Blocks<'_> {
    Blocks {
      walk: self
        .region
        .span()
        .ok()
        .map(|span| (span.walk(), span.addr(0))),
      index: 0,
    }
  }

  pub fn stats(
    &self,
  ) -> HeapStats {
    self
      .blocks()
      .fold(HeapStats::default(), |mut stats, block| {
        stats.blocks += 1;
        if block.allocated {
          stats.used += block.size;
        } else {
          stats.free += block.size;
          stats.largest_free = stats.largest_free.max(block.size);
        }
        stats
      })
  }

  /// Renders the block table into `out`.
  pub fn write_table<W: Write>(
    &self,
    out: &mut W,
  ) -> io::Result<()> {
    writeln!(out, "{:*^80}", " heap blocks ")?;
    writeln!(
      out,
      "{:<5} {:<6} {:<6} {:<18} {:<18} {:>8}",
      "No.", "Status", "Prev", "Begin", "End", "Size"
    )?;
    writeln!(out, "{:-<80}", "")?;

    for block in self.blocks() {
      writeln!(
        out,
        "{:<5} {:<6} {:<6} {:<#18x} {:<#18x} {:>8}",
        block.index,
        status(block.allocated),
        status(block.prev_allocated),
        block.begin,
        block.end,
        block.size
      )?;
    }

    let stats = self.stats();
    writeln!(out, "{:-<80}", "")?;
    writeln!(
      out,
      "used: {}  free: {}  total: {}",
      stats.used,
      stats.free,
      stats.used + stats.free
    )?;
    writeln!(out, "{:*<80}", "")
  }

  /// Prints the block table to stdout.
  pub fn dump(
    &self,
  ) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Err(e) = self.write_table(&mut out) {
      log::warn!("cannot write heap table: {}", e);
    }
  }

  /// Checks every structural invariant of the block list.
  pub fn verify(
    &self,
  ) -> Result<()> {
    let span = self.region.span()?;
    let corrupted = |offset, reason| Err(HeapError::Corrupted { offset, reason });

    let mut offset = HEAP_START;
    let mut prev: Option<Header> = None;

    loop {
      let Some(header) = span.header(offset) else {
        break;
      };

      if header.size() == 0 || header.size() % ALIGNMENT != 0 {
        return corrupted(offset, "block size is not a positive multiple of 8");
      }
      if offset + header.size() > span.end() {
        return corrupted(offset, "block runs past the end sentinel");
      }
      if header.prev_allocated() != prev.is_none_or(|p| p.is_allocated()) {
        return corrupted(offset, "prev_allocated bit disagrees with the preceding block");
      }
      if header.is_free() {
        if prev.is_some_and(|p| p.is_free()) {
          return corrupted(offset, "two adjacent free blocks");
        }
        if span.footer(offset, header.size()) != header.size() {
          return corrupted(offset, "footer does not match header");
        }
      }

      prev = Some(header);
      offset += header.size();
    }

    if offset != span.end() {
      return corrupted(offset, "end sentinel found before the end of the region");
    }

    Ok(())
  }
}

fn status(
  allocated: bool,
) -> &'static str {
  if allocated { "alloc" } else { "FREE" }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    GlobalSource,
    block::WORD_SIZE,
    testing::{heap, shape},
  };

  #[test]
  fn test_blocks_report_addresses() {
    let mut heap = heap(512);
    heap.allocate(24).unwrap();

    let blocks: Vec<_> = heap.blocks().collect();
    let base = heap.region.span().unwrap().addr(0);

    assert_eq!(
      blocks,
      [
        BlockInfo {
          index: 1,
          offset: 4,
          begin: base + 4,
          end: base + 35,
          size: 32,
          allocated: true,
          prev_allocated: true,
        },
        BlockInfo {
          index: 2,
          offset: 36,
          begin: base + 36,
          end: base + 507,
          size: 472,
          allocated: false,
          prev_allocated: true,
        },
      ]
    );
  }

  #[test]
  fn test_stats() {
    let mut heap = heap(512);
    let a = heap.allocate(24).unwrap();
    heap.allocate(100).unwrap();
    heap.release(a.as_ptr()).unwrap();

    assert_eq!(
      heap.stats(),
      HeapStats {
        blocks: 3,
        used: 104,
        free: 400,
        largest_free: 368,
      }
    );
  }

  #[test]
  fn test_write_table() {
    let mut heap = heap(512);
    heap.allocate(24).unwrap();

    let mut out = Vec::new();
    heap.write_table(&mut out).unwrap();
    let table = String::from_utf8(out).unwrap();
    let lines: Vec<_> = table.lines().collect();

    assert_eq!(lines.len(), 8);
    assert!(lines[3].starts_with("1     alloc  alloc "));
    assert!(lines[3].ends_with("      32"));
    assert!(lines[4].starts_with("2     FREE   alloc "));
    assert!(lines[4].ends_with("     472"));
    assert_eq!(lines[6], "used: 32  free: 472  total: 504");
  }

  #[test]
  fn test_uninitialized_heap_is_empty() {
    let heap = crate::Heap::with_source(GlobalSource::new(8));

    assert_eq!(heap.blocks().count(), 0);
    assert_eq!(heap.stats(), HeapStats::default());
    assert!(matches!(heap.verify(), Err(HeapError::Uninitialized)));
  }

  #[test]
  fn test_verify_detects_bad_footer() {
    let mut heap = heap(512);
    heap.allocate(24).unwrap();
    heap.verify().unwrap();

    let span = heap.region.span_mut().unwrap();
    span.set_word(36 + 472 - WORD_SIZE, 8);

    assert!(matches!(
      heap.verify(),
      Err(HeapError::Corrupted { offset: 36, .. })
    ));
  }

  #[test]
  fn test_verify_detects_stale_prev_bit() {
    let mut heap = heap(512);
    heap.allocate(24).unwrap();

    let span = heap.region.span_mut().unwrap();
    span.set_header(36, Header::free(472, false));

    assert!(matches!(
      heap.verify(),
      Err(HeapError::Corrupted { offset: 36, .. })
    ));
  }

  #[test]
  fn test_verify_detects_adjacent_free_blocks() {
    let mut heap = heap(512);

    let span = heap.region.span_mut().unwrap();
    span.set_header(HEAP_START, Header::free(32, true));
    span.set_footer(HEAP_START, 32);
    span.set_header(36, Header::free(472, false));

    assert!(matches!(
      heap.verify(),
      Err(HeapError::Corrupted { offset: 36, .. })
    ));
    assert_eq!(shape(&heap), [(32, false), (472, false)]);
  }
}
