//! # rbuddy - A Buddy Allocator over a Program Break
//!
//! This crate provides a **buddy allocator** that manages a single contiguous arena
//! grown with an `sbrk`-style call. All bookkeeping lives in-band: one header byte in
//! front of the arena and a one-byte-per-block ledger right behind it. There are no
//! linked lists and no side allocations.
//!
//! ## Overview
//!
//! The arena starts as one free block of `2^initial_order` bytes. Requests are rounded
//! up to a power of two and served from the leftmost free block of that size,
//! splitting larger blocks in halves ("buddies") when needed:
//!
//! ```text
//!   Allocating 1000 bytes from a 32 KiB arena (min block 4 KiB):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                               32768                                  │
//!   └──────────────────────────────────────────────────────────────────────┘
//!   ┌──────────────────────────────────┬───────────────────────────────────┐
//!   │              16384               │              16384                │
//!   └──────────────────────────────────┴───────────────────────────────────┘
//!   ┌────────────────┬─────────────────┬───────────────────────────────────┐
//!   │      8192      │      8192       │              16384                │
//!   └────────────────┴─────────────────┴───────────────────────────────────┘
//!   ┌───────┬────────┬─────────────────┬───────────────────────────────────┐
//!   │ ALLOC │  4096  │      8192       │              16384                │
//!   └───────┴────────┴─────────────────┴───────────────────────────────────┘
//! ```
//!
//! Freeing a block merges it with its buddy while the buddy is free too, climbing
//! back up the orders as far as it can.
//!
//! ## Crate Structure
//!
//! ```text
//!   rbuddy
//!   ├── order      - block_size! macro and request rounding
//!   ├── block      - Block record and its one-byte encoding
//!   ├── brk        - ProgramBreak trait, VirtualBreak, SystemBreak
//!   ├── config     - BuddyConfig
//!   ├── error      - AllocError
//!   ├── report     - Report of every block in address order
//!   ├── ledger     - in-band ledger (internal)
//!   ├── buddy      - split / merge (internal)
//!   └── heap       - BuddyAllocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rbuddy::{BuddyAllocator, BuddyConfig, VirtualBreak};
//!
//! let brk = VirtualBreak::with_capacity(1 << 16);
//! let mut allocator = BuddyAllocator::init(brk, BuddyConfig::new(15, 12)).unwrap();
//!
//! let block = allocator.allocate(1000).unwrap();
//! assert_eq!(
//!   allocator.report().to_string(),
//!   "allocated 4096\nfree 4096\nfree 8192\nfree 16384\n"
//! );
//!
//! allocator.free(block.as_ptr()).unwrap();
//! assert_eq!(allocator.report().to_string(), "free 32768\n");
//! ```
//!
//! ## Memory Layout
//!
//! ```text
//!   ┌────────┬─────────────────────────────┬───────────┬────┬────┬─────┬──────┐
//!   │ header │     arena (2^order bytes)   │ min order │ B1 │ B2 │ ... │ 0xFF │
//!   └────────┴─────────────────────────────┴───────────┴────┴────┴─────┴──────┘
//!            ▲                                                               ▲
//!            └── first block                                     program break
//! ```
//!
//! Each ledger byte holds a block's order, with the high bit set while the block
//! is allocated. A split grows the break by one byte, a merge shrinks it by one.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Block-size alignment only**: Blocks are aligned to their size relative to
//!   the first block, which itself sits one byte past the region start
//! - **One arena per allocator**: The arena never grows past its initial order
//!
//! ## Safety
//!
//! The allocator hands out raw pointers into memory it owns. They stay valid until
//! the block is freed or moved by `resize`, or the allocator is released or dropped.

pub mod block;
pub mod brk;
mod buddy;
pub mod config;
pub mod error;
mod heap;
mod ledger;
pub mod order;
pub mod report;

pub use block::Block;
#[cfg(unix)]
pub use brk::SystemBreak;
pub use brk::{ProgramBreak, VirtualBreak};
pub use config::BuddyConfig;
pub use error::{AllocError, Result};
pub use heap::BuddyAllocator;
pub use report::{BlockInfo, BlockStatus, Report};
