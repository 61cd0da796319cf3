use std::{ptr, ptr::NonNull, slice};

use crate::block::Block;

/// The in-band block ledger, stored right after the arena.
///
/// ```text
///   slot:   0           1 ..= len                 len + 1
///         ┌───────────┬─────┬─────┬─────┬───────┬────────────┐
///         │ min order │ B1  │ B2  │ ... │  Bn   │ terminator │
///         └───────────┴─────┴─────┴─────┴───────┴────────────┘
/// ```
///
/// Records are kept in address order, so a block's offset in the arena is the
/// sum of the sizes of every record before it.
pub(crate) struct Ledger {
  base: NonNull<u8>,
  len: usize,
}

/// A copy of the ledger bytes taken before a mutation that may need undoing.
pub(crate) struct LedgerSnapshot {
  bytes: Vec<u8>,
}

impl LedgerSnapshot {
  /// Bytes the snapshot occupies once restored.
  pub fn footprint(&self) -> usize {
    self.bytes.len()
  }
}

impl Ledger {
  /// Writes a ledger holding the single record `first`.
  ///
  /// # Safety
  ///
  /// `base` must be valid for writes of three bytes, and the ledger must not be
  /// used once those bytes are given back.
  pub unsafe fn create(
    base: NonNull<u8>,
    min_order: u8,
    first: Block,
  ) -> Self {
    unsafe {
      base.write(min_order);
      base.add(1).write(first.encode());
      base.add(2).write(Block::TERMINATOR);
    }

    Self { base, len: 1 }
  }

  /// Number of records, one per block in the arena.
  pub fn len(&self) -> usize {
    self.len
  }

  /// Bytes the ledger currently occupies, slot 0 and terminator included.
  pub fn footprint(&self) -> usize {
    self.len + 2
  }

  pub fn min_order(&self) -> u8 {
    self.bytes()[0]
  }

  fn bytes(&self) -> &[u8] {
    // SAFETY: the owner keeps `footprint()` bytes reserved behind `base`.
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.footprint()) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    // SAFETY: as in `bytes`; `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.footprint()) }
  }

  /// The record at `index`, counted from 1.
  pub fn get(
    &self,
    index: usize,
  ) -> Block {
    assert!(
      (1..=self.len).contains(&index),
      "ledger index {index} out of 1..={}",
      self.len
    );

    Block::decode(self.bytes()[index])
  }

  pub fn set(
    &mut self,
    index: usize,
    block: Block,
  ) {
    assert!(
      (1..=self.len).contains(&index),
      "ledger index {index} out of 1..={}",
      self.len
    );

    self.bytes_mut()[index] = block.encode();
  }

  pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
    self.bytes()[1..=self.len].iter().map(|byte| Block::decode(*byte))
  }

  /// Every record with its index and arena offset, in address order.
  pub fn entries(&self) -> impl Iterator<Item = (usize, usize, Block)> + '_ {
    self
      .blocks()
      .enumerate()
      .scan(0usize, |offset, (position, block)| {
        let start = *offset;
        *offset += block.size();
        Some((position + 1, start, block))
      })
  }

  pub fn offset_of(
    &self,
    index: usize,
  ) -> usize {
    self.blocks().take(index - 1).map(Block::size).sum()
  }

  /// Leftmost free block of `order`, as `(index, offset)`.
  pub fn find_free(
    &self,
    order: u8,
  ) -> Option<(usize, usize)> {
    self
      .entries()
      .find(|(_, _, block)| *block == Block::Free(order))
      .map(|(index, offset, _)| (index, offset))
  }

  /// Index of the leftmost free block spanning exactly `size` bytes.
  pub fn find_free_of_size(
    &self,
    size: usize,
  ) -> Option<usize> {
    self
      .blocks()
      .position(|block| block.is_free() && block.size() == size)
      .map(|position| position + 1)
  }

  /// Index of the block starting at `offset`, if any block starts there.
  pub fn index_at(
    &self,
    offset: usize,
  ) -> Option<usize> {
    self
      .entries()
      .take_while(|(_, start, _)| *start <= offset)
      .find(|(_, start, _)| *start == offset)
      .map(|(index, _, _)| index)
  }

  /// Inserts `block` at `index`, shifting it and every later record one slot right.
  ///
  /// # Safety
  ///
  /// One more byte past the terminator must already be reserved.
  pub unsafe fn insert(
    &mut self,
    index: usize,
    block: Block,
  ) {
    assert!(
      (1..=self.len + 1).contains(&index),
      "ledger insert at {index} out of 1..={}",
      self.len + 1
    );

    unsafe {
      let at = self.base.add(index).as_ptr();
      ptr::copy(at, at.add(1), self.footprint() - index);
      at.write(block.encode());
    }

    self.len += 1;
  }

  /// Removes the record at `index`, shifting every later record one slot left.
  ///
  /// The old terminator slot is never read or written, so it may already have
  /// been given back.
  pub fn remove(
    &mut self,
    index: usize,
  ) -> Block {
    assert!(
      (1..=self.len).contains(&index),
      "ledger index {index} out of 1..={}",
      self.len
    );

    let last = self.len;
    self.len -= 1;

    let bytes = self.bytes_mut();
    let block = Block::decode(bytes[index]);
    bytes.copy_within(index + 1..=last, index);
    bytes[last] = Block::TERMINATOR;

    block
  }

  /// First byte past the ledger, where the break should sit.
  pub fn end(&self) -> NonNull<u8> {
    // SAFETY: one past the reserved bytes, still within the same region.
    unsafe { self.base.add(self.footprint()) }
  }

  pub fn snapshot(&self) -> LedgerSnapshot {
    LedgerSnapshot {
      bytes: self.bytes().to_vec(),
    }
  }

  /// Overwrites the ledger with `snapshot`.
  ///
  /// # Safety
  ///
  /// `snapshot.footprint()` bytes must be reserved behind the ledger base.
  pub unsafe fn restore(
    &mut self,
    snapshot: &LedgerSnapshot,
  ) {
    self.len = snapshot.footprint() - 2;
    self.bytes_mut().copy_from_slice(&snapshot.bytes);
  }
}
