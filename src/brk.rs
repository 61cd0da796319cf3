//! Growth backends for the managed region.
//!
//! The allocator never asks for memory any other way: the arena, its header and
//! the ledger all sit in one contiguous region whose tail is moved with
//! [`ProgramBreak::sbrk`].

use std::ptr::NonNull;

use crate::{AllocError, Result};

/// Moves the end of a contiguous region, like `sbrk(2)`.
pub trait ProgramBreak {
  /// Moves the break by `increment` bytes and returns the previous break.
  ///
  /// A negative increment gives bytes back. Fails with
  /// [`AllocError::BreakExhausted`] when the region cannot grow or shrink that far,
  /// in which case the break does not move.
  fn sbrk(
    &mut self,
    increment: isize,
  ) -> Result<NonNull<u8>>;
}

/// A fixed-capacity region owned by the allocator: a virtual program break.
///
/// The backing memory is allocated once and never moves, so pointers handed
/// out by the allocator stay valid for as long as the `VirtualBreak` lives.
pub struct VirtualBreak {
  memory: NonNull<[u8]>,
  brk: usize,
}

impl VirtualBreak {
  pub fn with_capacity(capacity: usize) -> Self {
    let memory = Box::into_raw(vec![0u8; capacity].into_boxed_slice());

    Self {
      // SAFETY: `Box::into_raw` never returns null.
      memory: unsafe { NonNull::new_unchecked(memory) },
      brk: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.memory.len()
  }

  /// Bytes currently below the break.
  pub fn used(&self) -> usize {
    self.brk
  }
}

impl ProgramBreak for VirtualBreak {
  fn sbrk(
    &mut self,
    increment: isize,
  ) -> Result<NonNull<u8>> {
    let next = self
      .brk
      .checked_add_signed(increment)
      .filter(|next| *next <= self.capacity())
      .ok_or(AllocError::BreakExhausted { increment })?;

    // SAFETY: `brk <= capacity`, so the offset stays within the allocation or one past it.
    let previous = unsafe { self.memory.cast::<u8>().add(self.brk) };
    self.brk = next;

    Ok(previous)
  }
}

impl Drop for VirtualBreak {
  fn drop(&mut self) {
    // SAFETY: `memory` came from `Box::into_raw` and is released only here.
    drop(unsafe { Box::from_raw(self.memory.as_ptr()) });
  }
}

/// The process's real program break, moved through `libc::sbrk`.
#[cfg(unix)]
pub struct SystemBreak {
  _private: (),
}

#[cfg(unix)]
impl SystemBreak {
  /// # Safety
  ///
  /// Nothing else in the process may move the program break while the allocator
  /// built on this backend is alive, and only one thread may use it.
  pub unsafe fn new() -> Self {
    Self { _private: () }
  }

  /// Current program break, as reported by `sbrk(0)`.
  pub fn current() -> *mut u8 {
    // SAFETY: `sbrk(0)` only reads the break and never moves it.
    unsafe { libc::sbrk(0) as *mut u8 }
  }
}

#[cfg(unix)]
impl ProgramBreak for SystemBreak {
  fn sbrk(
    &mut self,
    increment: isize,
  ) -> Result<NonNull<u8>> {
    // SAFETY: `new` made the caller promise that this backend is the only one
    // moving the break.
    let previous = unsafe { libc::sbrk(increment as libc::intptr_t) };

    if previous == usize::MAX as *mut libc::c_void {
      log::warn!("[buddy] sbrk({increment}) failed");
      return Err(AllocError::BreakExhausted { increment });
    }

    NonNull::new(previous as *mut u8).ok_or(AllocError::BreakExhausted { increment })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_virtual_break_returns_previous_break() {
    let mut brk = VirtualBreak::with_capacity(64);

    let first = brk.sbrk(16).unwrap();
    let second = brk.sbrk(8).unwrap();

    assert_eq!(unsafe { second.offset_from(first) }, 16);
    assert_eq!(brk.used(), 24);

    let third = brk.sbrk(-8).unwrap();

    assert_eq!(unsafe { third.offset_from(first) }, 24);
    assert_eq!(brk.used(), 16);
  }

  #[test]
  fn test_virtual_break_exhaustion_leaves_break_alone() {
    let mut brk = VirtualBreak::with_capacity(32);

    brk.sbrk(30).unwrap();

    assert_eq!(
      brk.sbrk(3),
      Err(AllocError::BreakExhausted { increment: 3 })
    );
    assert_eq!(brk.used(), 30);

    assert_eq!(
      brk.sbrk(-31),
      Err(AllocError::BreakExhausted { increment: -31 })
    );
    assert_eq!(brk.used(), 30);

    brk.sbrk(2).unwrap();
    assert_eq!(brk.used(), brk.capacity());
  }

  #[test]
  #[ignore = "moves the real program break of the test process"]
  #[cfg(unix)]
  fn test_system_break_round_trip() {
    let mut brk = unsafe { SystemBreak::new() };

    let before = SystemBreak::current();
    let previous = brk.sbrk(4096).unwrap();

    assert_eq!(previous.as_ptr(), before);

    brk.sbrk(-4096).unwrap();
    assert_eq!(SystemBreak::current(), before);
  }
}
