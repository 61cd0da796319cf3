use std::fmt;

use crate::block::Block;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
  Free,
  Allocated,
}

/// One line of a [`Report`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub status: BlockStatus,
  pub size: usize,
}

impl From<Block> for BlockInfo {
  fn from(block: Block) -> Self {
    let status = if block.is_free() {
      BlockStatus::Free
    } else {
      BlockStatus::Allocated
    };

    Self {
      status,
      size: block.size(),
    }
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self.status {
      BlockStatus::Free => write!(f, "free {}", self.size),
      BlockStatus::Allocated => write!(f, "allocated {}", self.size),
    }
  }
}

/// Every block of the arena in address order.
///
/// Displays as one `free <n>` / `allocated <n>` line per block, each ending in a
/// newline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
  blocks: Vec<BlockInfo>,
}

impl Report {
  pub fn blocks(&self) -> &[BlockInfo] {
    &self.blocks
  }

  pub fn len(&self) -> usize {
    self.blocks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Sum of all block sizes; always the arena size.
  pub fn total_size(&self) -> usize {
    self.blocks.iter().map(|block| block.size).sum()
  }

  pub fn free_size(&self) -> usize {
    self
      .blocks
      .iter()
      .filter(|block| block.status == BlockStatus::Free)
      .map(|block| block.size)
      .sum()
  }
}

impl FromIterator<Block> for Report {
  fn from_iter<I: IntoIterator<Item = Block>>(iter: I) -> Self {
    Self {
      blocks: iter.into_iter().map(BlockInfo::from).collect(),
    }
  }
}

impl fmt::Display for Report {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for block in &self.blocks {
      writeln!(f, "{block}")?;
    }

    Ok(())
  }
}
