use crate::block_size;

/// One ledger record: a block of `2^order` bytes and whether it is handed out.
///
/// The byte encoding stays inside the crate:
///
/// ```compile_fail
/// let byte = rbuddy::Block::Free(12).encode();
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Block {
  Free(u8),
  Allocated(u8),
}

impl Block {
  /// Byte marking the end of the live records.
  pub(crate) const TERMINATOR: u8 = 0xFF;

  const ALLOCATED_FLAG: u8 = 0x80;

  pub fn order(self) -> u8 {
    match self {
      Block::Free(order) | Block::Allocated(order) => order,
    }
  }

  pub fn size(self) -> usize {
    block_size!(self.order())
  }

  pub fn is_free(self) -> bool {
    matches!(self, Block::Free(_))
  }

  pub fn allocated(self) -> Self {
    Block::Allocated(self.order())
  }

  pub fn freed(self) -> Self {
    Block::Free(self.order())
  }

  /// In-band representation: the order, with the high bit set when allocated.
  pub(crate) fn encode(self) -> u8 {
    match self {
      Block::Free(order) => order,
      Block::Allocated(order) => order | Self::ALLOCATED_FLAG,
    }
  }

  /// Decodes a record byte. The terminator is not a record and must not be passed.
  pub(crate) fn decode(byte: u8) -> Self {
    debug_assert_ne!(byte, Self::TERMINATOR);

    if byte & Self::ALLOCATED_FLAG != 0 {
      Block::Allocated(byte & !Self::ALLOCATED_FLAG)
    } else {
      Block::Free(byte)
    }
  }
}
