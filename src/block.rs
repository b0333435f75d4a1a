//! Block header encoding.
//!
//! On disk (well, in the mapping) a header is a single 32-bit word:
//!
//! ```text
//!   31                                 2   1   0
//!  ┌─────────────────────────────────────┬───┬───┐
//!  │               size                  │ p │ a │
//!  └─────────────────────────────────────┴───┴───┘
//!      a = this block is allocated
//!      p = the block before this one is allocated
//! ```
//!
//! Free blocks repeat their plain size in a footer word at their last four
//! bytes. Code never touches the bits directly; it goes through [`Header`].

/// Size in bytes of a header or footer word.
pub const WORD_SIZE: usize = 4;

/// Alignment of block sizes and payload addresses.
pub const ALIGNMENT: usize = 8;

/// Smallest block that can exist on its own: a header plus a footer.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Word value marking the end of the block list.
pub const END_MARK: u32 = 1;

const ALLOCATED_BIT: u32 = 0b01;
const PREV_ALLOCATED_BIT: u32 = 0b10;
const SIZE_MASK: u32 = !(ALLOCATED_BIT | PREV_ALLOCATED_BIT);

/// Decoded block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
  size: usize,
  allocated: bool,
  prev_allocated: bool,
}

impl Header {
  pub fn free(
    size: usize,
    prev_allocated: bool,
  ) -> Self {
    Self::new(size, false, prev_allocated)
  }

  pub fn allocated(
    size: usize,
    prev_allocated: bool,
  ) -> Self {
    Self::new(size, true, prev_allocated)
  }

  fn new(
    size: usize,
    allocated: bool,
    prev_allocated: bool,
  ) -> Self {
    debug_assert!(
      size % ALIGNMENT == 0 && size <= SIZE_MASK as usize,
      "block size {size} is not encodable"
    );
    Self {
      size,
      allocated,
      prev_allocated,
    }
  }

  /// Decodes a header word. Returns `None` for the end sentinel.
  pub fn decode(
    word: u32,
  ) -> Option<Self> {
    if word == END_MARK {
      return None;
    }

    Some(Self {
      size: (word & SIZE_MASK) as usize,
      allocated: word & ALLOCATED_BIT != 0,
      prev_allocated: word & PREV_ALLOCATED_BIT != 0,
    })
  }

  pub fn encode(
    self,
  ) -> u32 {
    let mut word = self.size as u32;
    if self.allocated {
      word |= ALLOCATED_BIT;
    }
    if self.prev_allocated {
      word |= PREV_ALLOCATED_BIT;
    }
    word
  }

  /// Block size in bytes, header included.
  pub fn size(
    self,
  ) -> usize {
    self.size
  }

  pub fn is_allocated(
    self,
  ) -> bool {
    self.allocated
  }

  pub fn is_free(
    self,
  ) -> bool {
    !self.allocated
  }

  pub fn prev_allocated(
    self,
  ) -> bool {
    self.prev_allocated
  }

  pub fn with_size(
    self,
    size: usize,
  ) -> Self {
    Self::new(size, self.allocated, self.prev_allocated)
  }

  pub fn with_allocated(
    self,
    allocated: bool,
  ) -> Self {
    Self { allocated, ..self }
  }

  pub fn with_prev_allocated(
    self,
    prev_allocated: bool,
  ) -> Self {
    Self {
      prev_allocated,
      ..self
    }
  }
}

/// Largest block size a header word can describe.
pub const MAX_BLOCK_SIZE: usize = SIZE_MASK as usize & !(ALIGNMENT - 1);
