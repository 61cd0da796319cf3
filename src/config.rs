//! Allocator configuration.

use crate::{
  AllocError, Result, block_size,
  order::{MAX_ARENA_ORDER, MAX_ORDER},
};

/// Shape of the arena managed by a [`BuddyAllocator`](crate::BuddyAllocator).
///
/// Validated by [`BuddyAllocator::init`](crate::BuddyAllocator::init); both orders are
/// fixed for the allocator's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuddyConfig {
  /// The arena spans `2^initial_order` bytes.
  pub initial_order: u8,

  /// Blocks are never split below `2^min_order` bytes.
  pub min_order: u8,
}

impl BuddyConfig {
  /// Default arena order: 1 MiB.
  pub const DEFAULT_INITIAL_ORDER: u8 = 20;

  /// Default minimum order: 4 KiB.
  pub const DEFAULT_MIN_ORDER: u8 = 12;

  /// Header byte, min-order slot, the first record and the terminator.
  const INITIAL_OVERHEAD: usize = 4;

  pub fn new(
    initial_order: u8,
    min_order: u8,
  ) -> Self {
    Self {
      initial_order,
      min_order,
    }
  }

  pub fn validate(&self) -> Result<()> {
    for order in [self.min_order, self.initial_order] {
      if order > MAX_ORDER {
        return Err(AllocError::OrderOutOfRange {
          order,
          max: MAX_ORDER,
        });
      }
    }

    if self.initial_order < self.min_order {
      return Err(AllocError::InvalidConfig {
        initial_order: self.initial_order,
        min_order: self.min_order,
      });
    }

    if self.initial_order > MAX_ARENA_ORDER {
      return Err(AllocError::OrderOutOfRange {
        order: self.initial_order,
        max: MAX_ARENA_ORDER,
      });
    }

    Ok(())
  }

  /// Usable bytes in the arena. Only meaningful for a validated config.
  pub fn arena_size(&self) -> usize {
    block_size!(self.initial_order)
  }

  /// Bytes reserved from the break at initialization.
  pub fn footprint(&self) -> usize {
    self.arena_size() + Self::INITIAL_OVERHEAD
  }
}

impl Default for BuddyConfig {
  fn default() -> Self {
    Self::new(Self::DEFAULT_INITIAL_ORDER, Self::DEFAULT_MIN_ORDER)
  }
}
