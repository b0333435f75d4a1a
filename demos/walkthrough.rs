use std::{env, io::Read, ptr};

use bfalloc::{Config, Heap};

/// Waits until the user presses ENTER when `--pause` was given.
/// Useful when you want to inspect the mapping with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed(
  pause: bool,
) {
  if !pause {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn main() -> bfalloc::Result<()> {
  env_logger::init();
  let pause = env::args().any(|arg| arg == "--pause");

  // One page is plenty for a handful of small blocks. Every successful
  // allocate and release prints the block table.
  let mut heap = Heap::new().with_config(Config { echo_table: true });
  heap.init(4096)?;

  println!("[0] PID = {}, fresh heap", std::process::id());
  heap.dump();
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 1) Allocate space for a u32. The request grows by the 4-byte header
  //    and is rounded to 8, so this takes an 8-byte block.
  // --------------------------------------------------------------------
  println!("\n[1] Allocate u32");
  let first = heap.try_allocate(4)?;
  let first_ptr = first.as_ptr().cast::<u32>();
  unsafe { first_ptr.write(0xDEADBEEF) };
  println!("[1] Value written = 0x{:X}", unsafe { first_ptr.read() });
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 2) Allocate 12 bytes and fill them with a pattern.
  // --------------------------------------------------------------------
  println!("\n[2] Allocate [u8; 12]");
  let second = heap.try_allocate(12)?;
  unsafe { ptr::write_bytes(second.as_ptr(), 0xAB, 12) };
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 3) Allocate a u64 and check its alignment.
  // --------------------------------------------------------------------
  println!("\n[3] Allocate u64 (observe alignment)");
  let third = heap.try_allocate(8)?;
  println!(
    "[3] Address = {:#X}, addr % 8 = {}",
    third.as_ptr() as usize,
    third.as_ptr() as usize % 8
  );
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 4) Free the middle block. Its neighbours are both allocated, so it
  //    stays on its own and the block after it learns its predecessor is
  //    free.
  // --------------------------------------------------------------------
  println!("\n[4] Release second block");
  heap.release(second.as_ptr())?;
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 5) A 2-byte request fits the freed 16-byte hole better than the big
  //    tail block, so best fit reuses it.
  // --------------------------------------------------------------------
  println!("\n[5] Allocate [u8; 2] (check reuse of freed block)");
  let fifth = heap.try_allocate(2)?;
  println!(
    "[5] fifth == second? {}",
    if fifth == second {
      "Yes, it reused the freed block"
    } else {
      "No, it allocated somewhere else"
    }
  );
  block_until_enter_pressed(pause);

  // --------------------------------------------------------------------
  // 6) Release everything; the blocks coalesce back into one.
  // --------------------------------------------------------------------
  println!("\n[6] Release all blocks");
  for block in [first, fifth, third] {
    heap.release(block.as_ptr())?;
  }

  let stats = heap.stats();
  println!(
    "\n[7] End of example: {} block(s), {} bytes free",
    stats.blocks, stats.free
  );
  Ok(())
}
