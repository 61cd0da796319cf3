use std::{ptr, ptr::NonNull, slice};

use crate::{
  AllocError, Result,
  block::Block,
  block_size,
  brk::ProgramBreak,
  buddy,
  config::BuddyConfig,
  ledger::{Ledger, LedgerSnapshot},
  order::order_for,
  report::Report,
};

/// A buddy allocator over one contiguous region obtained from a [`ProgramBreak`].
///
/// ```text
///   heap_start
///   │
///   ▼
///   ┌────────┬──────────────────────────────────────┬─────────────────┐
///   │ header │            arena: 2^order            │     ledger      │
///   │ (order)│  blocks handed out by `allocate`     │ one byte/block  │
///   └────────┴──────────────────────────────────────┴─────────────────┘
///            ▲                                                        ▲
///            └── arena_start                               program break
/// ```
///
/// The allocator is single-threaded: it is neither `Send` nor `Sync`, and callers
/// sharing one between threads must wrap every call in their own lock.
pub struct BuddyAllocator<B: ProgramBreak> {
  brk: B,
  heap_start: NonNull<u8>,
  ledger: Ledger,
}

impl<B: ProgramBreak> BuddyAllocator<B> {
  /// Reserves the arena and its ledger from `brk` and marks the whole arena free.
  pub fn init(
    mut brk: B,
    config: BuddyConfig,
  ) -> Result<Self> {
    config.validate()?;

    let heap_start = brk.sbrk(config.footprint() as isize)?;

    // SAFETY: `footprint()` bytes were just reserved: the header, the arena and
    // the three bytes of the initial ledger.
    let ledger = unsafe {
      heap_start.write(config.initial_order);
      Ledger::create(
        heap_start.add(1 + config.arena_size()),
        config.min_order,
        Block::Free(config.initial_order),
      )
    };

    log::debug!(
      "[buddy] init arena={} min_block={} heap_start={:p}",
      config.arena_size(),
      block_size!(config.min_order),
      heap_start
    );

    Ok(Self {
      brk,
      heap_start,
      ledger,
    })
  }

  /// Start of the managed region; the header byte lives here.
  pub fn heap_start(&self) -> NonNull<u8> {
    self.heap_start
  }

  /// Address of the first block, one byte past the header.
  pub fn arena_start(&self) -> NonNull<u8> {
    // SAFETY: the header and the arena are reserved for the allocator's lifetime.
    unsafe { self.heap_start.add(1) }
  }

  /// Order of the whole arena, read back from the header.
  pub fn initial_order(&self) -> u8 {
    // SAFETY: the header byte is reserved and only written by `init`.
    unsafe { self.heap_start.read() }
  }

  pub fn min_order(&self) -> u8 {
    self.ledger.min_order()
  }

  pub fn arena_size(&self) -> usize {
    block_size!(self.initial_order())
  }

  /// Number of blocks, free or allocated, currently in the arena.
  pub fn block_count(&self) -> usize {
    self.ledger.len()
  }

  /// Bytes currently reserved from the break.
  pub fn footprint(&self) -> usize {
    1 + self.arena_size() + self.ledger.footprint()
  }

  /// Hands out the leftmost block able to hold `size` bytes.
  ///
  /// When no free block of the right order exists, larger free blocks are split
  /// until one does. Blocks are never smaller than `2^min_order` bytes.
  pub fn allocate(
    &mut self,
    size: u32,
  ) -> Result<NonNull<u8>> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    if u64::from(size) > self.arena_size() as u64 {
      return Err(AllocError::TooLarge {
        requested: size,
        arena: self.arena_size(),
      });
    }

    let order = order_for(size, self.min_order());

    if let Some(block) = self.claim(order) {
      return Ok(block);
    }

    // Look `step` orders up for a free block, then split it and each leftmost
    // half back down to `order`. A missing order ends this step early.
    for step in 1..=self.initial_order() - order {
      for above in (1..=step).rev() {
        let Some(index) = self
          .ledger
          .find_free_of_size(block_size!(order + above))
        else {
          break;
        };

        buddy::split(&mut self.ledger, &mut self.brk, index)?;
      }

      if let Some(block) = self.claim(order) {
        return Ok(block);
      }
    }

    Err(AllocError::OutOfMemory { requested: size })
  }

  /// Marks the leftmost free block of `order` allocated.
  fn claim(
    &mut self,
    order: u8,
  ) -> Option<NonNull<u8>> {
    let (index, offset) = self.ledger.find_free(order)?;

    self.ledger.set(index, Block::Allocated(order));
    log::trace!("[buddy] claim #{index} size={} offset={offset}", block_size!(order));

    // SAFETY: every block lies inside the arena.
    Some(unsafe { self.arena_start().add(offset) })
  }

  /// Finds the record of the block starting exactly at `ptr`.
  fn locate(
    &self,
    ptr: *const u8,
  ) -> Result<(usize, usize, Block)> {
    let addr = ptr.addr();

    let offset = addr
      .checked_sub(self.arena_start().as_ptr().addr())
      .filter(|offset| *offset < self.arena_size())
      .ok_or(AllocError::InvalidPointer { addr })?;

    let index = self
      .ledger
      .index_at(offset)
      .ok_or(AllocError::InvalidPointer { addr })?;

    Ok((index, offset, self.ledger.get(index)))
  }

  /// Gives back the block starting at `ptr` and coalesces it with free buddies.
  ///
  /// Pointers that are not the start of an allocated block are rejected and the
  /// ledger is left untouched. If the break cannot be moved while coalescing, the
  /// block stays freed but not every buddy is merged.
  pub fn free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<()> {
    let (index, _, block) = self
      .locate(ptr)
      .inspect_err(|error| log::warn!("[buddy] free({ptr:p}) rejected: {error}"))?;

    if block.is_free() {
      log::warn!("[buddy] free({ptr:p}) rejected: already free");
      return Err(AllocError::DoubleFree { addr: ptr.addr() });
    }

    self.ledger.set(index, block.freed());
    buddy::coalesce(&mut self.ledger, &mut self.brk, index)?;

    Ok(())
  }

  /// Moves the allocation at `ptr` into a block of `new_size` bytes.
  ///
  /// The first `min(old size, new_size)` bytes are carried over. A `new_size` of
  /// zero frees the block and returns `None`; a null `ptr` allocates. If the new
  /// block cannot be found the old one stays allocated with its contents intact.
  pub fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: u32,
  ) -> Result<Option<NonNull<u8>>> {
    if ptr.is_null() {
      return match new_size {
        0 => Ok(None),
        size => self.allocate(size).map(Some),
      };
    }

    let snapshot = self.ledger.snapshot();
    let (_, _, block) = self.locate(ptr)?;

    if let Err(error) = self.free(ptr) {
      self.restore(&snapshot)?;
      return Err(error);
    }

    if new_size == 0 {
      return Ok(None);
    }

    match self.allocate(new_size) {
      Ok(moved) => {
        let count = block.size().min(new_size as usize);

        // SAFETY: both ranges lie inside the arena and may overlap. Freeing the old
        // block only rewrote the ledger, so its bytes are still in place.
        unsafe { ptr::copy(ptr, moved.as_ptr(), count) };

        log::trace!("[buddy] resize {ptr:p} -> {moved:p} copied={count}");
        Ok(Some(moved))
      }
      Err(error) => {
        self.restore(&snapshot)?;
        Err(error)
      }
    }
  }

  /// Puts back a ledger snapshot, moving the break to fit it.
  fn restore(
    &mut self,
    snapshot: &LedgerSnapshot,
  ) -> Result<()> {
    let delta = snapshot.footprint() as isize - self.ledger.footprint() as isize;

    if delta != 0 {
      buddy::move_break(&self.ledger, &mut self.brk, delta)?;
    }

    // SAFETY: the break now covers exactly the snapshot's footprint.
    unsafe { self.ledger.restore(snapshot) };

    Ok(())
  }

  /// Size of the allocated block starting at `ptr`.
  pub fn size_of(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    match self.locate(ptr) {
      Ok((_, _, block)) if !block.is_free() => Some(block.size()),
      _ => None,
    }
  }

  /// The bytes of the allocated block starting at `ptr`.
  pub fn block_mut(
    &mut self,
    ptr: *const u8,
  ) -> Option<&mut [u8]> {
    let (_, offset, block) = self.locate(ptr).ok()?;

    if block.is_free() {
      return None;
    }

    // SAFETY: the block lies inside the arena and `&mut self` keeps the allocator
    // from touching it while the slice lives.
    Some(unsafe {
      slice::from_raw_parts_mut(self.arena_start().add(offset).as_ptr(), block.size())
    })
  }

  /// Every block in address order.
  pub fn report(&self) -> Report {
    self.ledger.blocks().collect()
  }

  /// Prints [`report`](Self::report) to stdout.
  pub fn print_info(&self) {
    print!("{}", self.report());
  }

  /// Gives the whole region back to the break and returns the backend.
  ///
  /// Every pointer handed out by this allocator dangles afterwards.
  pub fn release(self) -> Result<B> {
    let footprint = self.footprint();
    let Self {
      mut brk, ledger, ..
    } = self;

    buddy::move_break(&ledger, &mut brk, -(footprint as isize))?;
    log::debug!("[buddy] released {footprint} bytes");

    Ok(brk)
  }
}
