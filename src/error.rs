//! Error types for the buddy allocator.

use thiserror::Error;

/// Errors that can occur while managing the arena.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The minimum block would be larger than the whole arena.
  #[error("initial order {initial_order} is smaller than minimum order {min_order}")]
  InvalidConfig {
    /// Order of the whole arena.
    initial_order: u8,
    /// Order of the smallest block.
    min_order: u8,
  },

  /// An order that cannot be encoded or addressed.
  #[error("order {order} exceeds the largest supported order {max}")]
  OrderOutOfRange {
    /// The rejected order.
    order: u8,
    /// Largest accepted order.
    max: u8,
  },

  /// Zero-byte requests never get a block.
  #[error("cannot allocate a zero-sized block")]
  ZeroSize,

  /// The request is larger than the whole arena.
  #[error("request of {requested} bytes exceeds the {arena} byte arena")]
  TooLarge {
    /// Bytes requested.
    requested: u32,
    /// Size of the arena.
    arena: usize,
  },

  /// No free block is large enough, even after splitting.
  #[error("no free block can hold {requested} bytes")]
  OutOfMemory {
    /// Bytes requested.
    requested: u32,
  },

  /// The address is not the start of any block in the arena.
  #[error("{addr:#x} is not the start of a block")]
  InvalidPointer {
    /// The rejected address.
    addr: usize,
  },

  /// The block at the address is already free.
  #[error("block at {addr:#x} is already free")]
  DoubleFree {
    /// The rejected address.
    addr: usize,
  },

  /// The growth backend could not move the break.
  #[error("program break cannot move by {increment} bytes")]
  BreakExhausted {
    /// Requested change in bytes.
    increment: isize,
  },

  /// The break no longer ends where the ledger does: something else moved it.
  #[error("program break is at {actual:#x}, expected {expected:#x}")]
  BreakMoved {
    /// End of the ledger.
    expected: usize,
    /// Break reported by the backend.
    actual: usize,
  },
}

impl AllocError {
  /// Whether the error means a request simply could not be satisfied.
  pub fn is_capacity(&self) -> bool {
    matches!(
      self,
      Self::ZeroSize | Self::TooLarge { .. } | Self::OutOfMemory { .. }
    )
  }

  /// Whether the error rejects a pointer handed to `free` or `resize`.
  pub fn is_invalid_pointer(&self) -> bool {
    matches!(self, Self::InvalidPointer { .. } | Self::DoubleFree { .. })
  }
}

/// Result type for allocator operations.
pub type Result<T> = std::result::Result<T, AllocError>;
