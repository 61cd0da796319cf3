use std::io::Read;

use rbuddy::{BuddyAllocator, BuddyConfig, ProgramBreak, VirtualBreak};

/// Waits until the user presses ENTER.
/// Pass `--step` to pause between stages, e.g. to watch the break with `pmap`.
fn block_until_enter_pressed(step: bool) {
  if !step {
    return;
  }

  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_state<B: ProgramBreak>(
  label: &str,
  allocator: &BuddyAllocator<B>,
) {
  println!(
    "\n[{}] blocks = {}, footprint = {} bytes",
    label,
    allocator.block_count(),
    allocator.footprint()
  );
  allocator.print_info();
}

fn run<B: ProgramBreak>(
  brk: B,
  step: bool,
) -> rbuddy::Result<()> {
  let mut allocator = BuddyAllocator::init(brk, BuddyConfig::new(15, 12))?;

  println!("heap start = {:p}", allocator.heap_start());
  print_state("start", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 1) 1000 bytes: the 32 KiB arena is halved down to a 4 KiB block.
  // --------------------------------------------------------------------
  let first = allocator.allocate(1000)?;
  println!("\n[1] allocate(1000) = {:p}", first);

  if let Some(bytes) = allocator.block_mut(first.as_ptr()) {
    bytes[..4].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
  }
  print_state("1", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 2) 5000 bytes round up to an 8 KiB block.
  // --------------------------------------------------------------------
  let second = allocator.allocate(5000)?;
  println!("\n[2] allocate(5000) = {:p}", second);
  print_state("2", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 3) Grow the first block; its contents follow it.
  // --------------------------------------------------------------------
  let moved = allocator.resize(first.as_ptr(), 6000)?;
  if let Some(moved) = moved {
    if let Some(bytes) = allocator.block_mut(moved.as_ptr()) {
      let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
      println!(
        "\n[3] resize(first, 6000) -> block of {} bytes, first word = 0x{:X}",
        bytes.len(),
        word
      );
    }
  }
  print_state("3", &allocator);
  block_until_enter_pressed(step);

  // --------------------------------------------------------------------
  // 4) Double free is reported, not fatal.
  // --------------------------------------------------------------------
  allocator.free(second.as_ptr())?;
  if let Err(error) = allocator.free(second.as_ptr()) {
    println!("\n[4] second free of {:p}: {}", second, error);
  }

  if let Some(moved) = moved {
    allocator.free(moved.as_ptr())?;
  }
  print_state("4", &allocator);

  allocator.release()?;
  println!("\n[5] End of example. Region given back to the break.");

  Ok(())
}

fn main() -> rbuddy::Result<()> {
  let args: Vec<String> = std::env::args().collect();
  let step = args.iter().any(|arg| arg == "--step");

  #[cfg(unix)]
  if args.iter().any(|arg| arg == "--system") {
    eprintln!(
      "warning: --system shares the program break with the C allocator; \
       a step fails with BreakMoved if malloc grows it in between"
    );

    // SAFETY: the demo is single-threaded and moves the break only through this
    // backend. glibc `malloc` (behind `println!` and `Vec`) may still call `sbrk`
    // on its own; the allocator then sees the break away from its ledger and
    // fails with `BreakMoved` instead of writing past its region.
    return run(unsafe { rbuddy::SystemBreak::new() }, step);
  }

  run(VirtualBreak::with_capacity(1 << 16), step)
}
