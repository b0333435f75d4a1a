use crate::{heap::Heap, source::GlobalSource};

/// A heap over exactly `len` bytes.
pub fn heap(
  len: usize,
) -> Heap<GlobalSource> {
  let _ = env_logger::builder().is_test(true).try_init();

  let mut heap = Heap::with_source(GlobalSource::new(8));
  heap.init(len).unwrap();
  heap
}

/// `(size, allocated)` of every block, in address order.
pub fn shape(
  heap: &Heap<GlobalSource>,
) -> Vec<(usize, bool)> {
  heap.blocks().map(|b| (b.size, b.allocated)).collect()
}
