//! Splitting free blocks into buddies and coalescing them back.
//!
//! Every split adds one ledger record and every merge removes one, so both move
//! the break by a single byte. The break is always moved before the ledger is
//! rewritten: a failed move leaves the ledger exactly as it was. After a merge
//! only the bytes still below the break are touched.

use crate::{
  AllocError, Result,
  block::Block,
  brk::ProgramBreak,
  ledger::Ledger,
};

/// Moves the break by `increment` bytes, checking it still ends at the ledger.
///
/// A break that something else has moved is put back where it was and reported
/// as [`AllocError::BreakMoved`].
pub(crate) fn move_break<B: ProgramBreak>(
  ledger: &Ledger,
  brk: &mut B,
  increment: isize,
) -> Result<()> {
  let expected = ledger.end();
  let previous = brk.sbrk(increment)?;

  if previous != expected {
    brk.sbrk(-increment)?;
    log::warn!("[buddy] break at {previous:p}, ledger ends at {expected:p}");

    return Err(AllocError::BreakMoved {
      expected: expected.as_ptr().addr(),
      actual: previous.as_ptr().addr(),
    });
  }

  Ok(())
}

/// Splits the free block at `index` into two free buddies of half its size.
///
/// Allocated blocks and blocks already at the minimum order are left alone.
/// Returns whether a split happened.
pub(crate) fn split<B: ProgramBreak>(
  ledger: &mut Ledger,
  brk: &mut B,
  index: usize,
) -> Result<bool> {
  let block = ledger.get(index);

  if !block.is_free() || block.order() <= ledger.min_order() {
    return Ok(false);
  }

  move_break(ledger, brk, 1)?;

  let half = Block::Free(block.order() - 1);
  ledger.set(index, half);
  // SAFETY: the byte past the terminator was reserved just above.
  unsafe { ledger.insert(index + 1, half) };

  log::trace!("[buddy] split #{index} into two blocks of {}", half.size());

  Ok(true)
}

/// Fuses the free block at `index` with its buddy, if the buddy is free too.
///
/// The right neighbour is tried first, then the left one. The pair must be free,
/// of equal order and aligned as one block of the next order; anything else is
/// not a buddy. Returns the index of the merged block.
pub(crate) fn merge<B: ProgramBreak>(
  ledger: &mut Ledger,
  brk: &mut B,
  index: usize,
) -> Result<Option<usize>> {
  let block = ledger.get(index);

  if !block.is_free() {
    return Ok(None);
  }

  let merged_size = block.size() << 1;

  let left = if index < ledger.len()
    && ledger.get(index + 1) == block
    && ledger.offset_of(index) % merged_size == 0
  {
    index
  } else if index > 1
    && ledger.get(index - 1) == block
    && ledger.offset_of(index - 1) % merged_size == 0
  {
    index - 1
  } else {
    return Ok(None);
  };

  move_break(ledger, brk, -1)?;

  ledger.remove(left + 1);
  ledger.set(left, Block::Free(block.order() + 1));

  log::trace!("[buddy] merged #{left} into a block of {merged_size}");

  Ok(Some(left))
}

/// Runs [`merge`] from `index` until no buddy is left to fuse.
///
/// Returns the index of the largest block the cascade produced.
pub(crate) fn coalesce<B: ProgramBreak>(
  ledger: &mut Ledger,
  brk: &mut B,
  mut index: usize,
) -> Result<usize> {
  while let Some(merged) = merge(ledger, brk, index)? {
    index = merged;
  }

  Ok(index)
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;
  use crate::brk::VirtualBreak;

  const POISON: u8 = 0xA5;

  /// Overwrites every byte given back, so reading one shows up as a stray record.
  struct PoisonedBreak(VirtualBreak);

  impl ProgramBreak for PoisonedBreak {
    fn sbrk(
      &mut self,
      increment: isize,
    ) -> Result<NonNull<u8>> {
      let previous = self.0.sbrk(increment)?;

      if increment < 0 {
        let count = increment.unsigned_abs();
        // SAFETY: the released bytes are still inside the virtual region.
        unsafe { previous.sub(count).write_bytes(POISON, count) };
      }

      Ok(previous)
    }
  }

  fn setup(
    initial_order: u8,
    min_order: u8,
  ) -> (VirtualBreak, Ledger) {
    let mut brk = VirtualBreak::with_capacity(64);
    let base: NonNull<u8> = brk.sbrk(3).unwrap();
    let ledger = unsafe { Ledger::create(base, min_order, Block::Free(initial_order)) };

    (brk, ledger)
  }

  fn orders(ledger: &Ledger) -> Vec<Block> {
    ledger.blocks().collect()
  }

  #[test]
  fn test_split_halves_block_and_grows_break() {
    let (mut brk, mut ledger) = setup(15, 12);

    assert!(split(&mut ledger, &mut brk, 1).unwrap());
    assert_eq!(orders(&ledger), vec![Block::Free(14), Block::Free(14)]);
    assert_eq!(brk.used(), ledger.footprint());

    assert!(split(&mut ledger, &mut brk, 2).unwrap());
    assert_eq!(
      orders(&ledger),
      vec![Block::Free(14), Block::Free(13), Block::Free(13)]
    );
    assert_eq!(brk.used(), ledger.footprint());
  }

  #[test]
  fn test_split_refuses_allocated_and_minimum_blocks() {
    let (mut brk, mut ledger) = setup(13, 12);

    ledger.set(1, Block::Allocated(13));
    assert!(!split(&mut ledger, &mut brk, 1).unwrap());

    ledger.set(1, Block::Free(13));
    assert!(split(&mut ledger, &mut brk, 1).unwrap());
    assert!(!split(&mut ledger, &mut brk, 1).unwrap());

    assert_eq!(orders(&ledger), vec![Block::Free(12), Block::Free(12)]);
  }

  #[test]
  fn test_split_failure_leaves_ledger_untouched() {
    let mut brk = VirtualBreak::with_capacity(3);
    let base = brk.sbrk(3).unwrap();
    let mut ledger = unsafe { Ledger::create(base, 12, Block::Free(15)) };

    assert_eq!(
      split(&mut ledger, &mut brk, 1),
      Err(AllocError::BreakExhausted { increment: 1 })
    );
    assert_eq!(orders(&ledger), vec![Block::Free(15)]);
  }

  #[test]
  fn test_merge_prefers_right_then_left() {
    let (mut brk, mut ledger) = setup(15, 12);

    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();

    assert_eq!(merge(&mut ledger, &mut brk, 1).unwrap(), Some(1));
    assert_eq!(orders(&ledger), vec![Block::Free(14), Block::Free(14)]);

    assert_eq!(merge(&mut ledger, &mut brk, 2).unwrap(), Some(1));
    assert_eq!(orders(&ledger), vec![Block::Free(15)]);
    assert_eq!(brk.used(), ledger.footprint());
  }

  #[test]
  fn test_merge_rejects_misaligned_neighbours() {
    let (mut brk, mut ledger) = setup(15, 12);

    // 4K 4K 4K 4K 16K
    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 3).unwrap();
    ledger.set(1, Block::Allocated(12));
    ledger.set(4, Block::Allocated(12));

    // Blocks 2 and 3 are neighbours of equal order but belong to different pairs.
    assert_eq!(merge(&mut ledger, &mut brk, 2).unwrap(), None);
    assert_eq!(merge(&mut ledger, &mut brk, 3).unwrap(), None);
    assert_eq!(ledger.len(), 5);
  }

  #[test]
  fn test_merge_ignores_allocated_and_mismatched_orders() {
    let (mut brk, mut ledger) = setup(15, 12);

    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();

    assert_eq!(merge(&mut ledger, &mut brk, 3).unwrap(), None);

    ledger.set(2, Block::Allocated(13));
    assert_eq!(merge(&mut ledger, &mut brk, 1).unwrap(), None);
    assert_eq!(merge(&mut ledger, &mut brk, 2).unwrap(), None);
  }

  #[test]
  fn test_coalesce_cascades_to_the_top() {
    let (mut brk, mut ledger) = setup(15, 12);

    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();
    ledger.set(1, Block::Allocated(12));
    ledger.set(1, Block::Free(12));

    assert_eq!(coalesce(&mut ledger, &mut brk, 1).unwrap(), 1);
    assert_eq!(orders(&ledger), vec![Block::Free(15)]);
    assert_eq!(brk.used(), 3);
  }

  #[test]
  fn test_split_refuses_a_break_moved_elsewhere() {
    let (mut brk, mut ledger) = setup(15, 12);
    let expected = ledger.end().as_ptr().addr();

    brk.sbrk(8).unwrap();

    assert_eq!(
      split(&mut ledger, &mut brk, 1),
      Err(AllocError::BreakMoved {
        expected,
        actual: expected + 8,
      })
    );
    assert_eq!(orders(&ledger), vec![Block::Free(15)]);
    assert_eq!(brk.used(), ledger.footprint() + 8);
  }

  #[test]
  fn test_merge_never_reads_released_bytes() {
    let mut brk = PoisonedBreak(VirtualBreak::with_capacity(64));
    let base = brk.sbrk(3).unwrap();
    let mut ledger = unsafe { Ledger::create(base, 12, Block::Free(15)) };

    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();
    split(&mut ledger, &mut brk, 1).unwrap();

    assert_eq!(coalesce(&mut ledger, &mut brk, 1).unwrap(), 1);
    assert_eq!(orders(&ledger), vec![Block::Free(15)]);
    assert_eq!(brk.0.used(), ledger.footprint());

    let end = ledger.end();
    unsafe {
      assert_eq!(end.sub(1).read(), Block::TERMINATOR);
      assert_eq!(end.read(), POISON);
      assert_eq!(end.add(2).read(), POISON);
    }

    assert!(split(&mut ledger, &mut brk, 1).unwrap());
    assert_eq!(orders(&ledger), vec![Block::Free(14), Block::Free(14)]);
    assert_eq!(unsafe { ledger.end().sub(1).read() }, Block::TERMINATOR);
  }
}
