/// Rounds `value` up to the block alignment (8 bytes).
///
/// Every block size and every payload address handed out by the heap is a
/// multiple of this alignment.
///
/// # Examples
///
/// ```rust
/// use bfalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(24 + 4), 32);
/// assert_eq!(align!(32), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::block::ALIGNMENT)
  };
}

/// Rounds `value` up to the next multiple of `align`, which must be a power
/// of two.
///
/// # Examples
///
/// ```rust
/// use bfalloc::align_to;
///
/// assert_eq!(align_to!(13, 4096), 4096);
/// assert_eq!(align_to!(8192, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to a multiple of `granule`, which need not be a power of
/// two. Returns `None` on overflow.
pub(crate) fn round_up(
  value: usize,
  granule: usize,
) -> Option<usize> {
  match value % granule {
    0 => Some(value),
    rem => value.checked_add(granule - rem),
  }
}

#[cfg(test)]
mod tests {
  use super::round_up;
  use crate::block::ALIGNMENT;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_align_to_page() {
    assert_eq!(align_to!(1usize, 4096usize), 4096);
    assert_eq!(align_to!(4096usize, 4096usize), 4096);
    assert_eq!(align_to!(4097usize, 4096usize), 8192);
  }

  #[test]
  fn test_round_up() {
    assert_eq!(round_up(0, 24), Some(0));
    assert_eq!(round_up(1, 24), Some(24));
    assert_eq!(round_up(48, 24), Some(48));
    assert_eq!(round_up(usize::MAX, 16), None);
  }
}
