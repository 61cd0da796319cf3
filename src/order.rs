/// Size in bytes of a block of the given order.
///
/// # Examples
///
/// ```rust
/// use rbuddy::block_size;
///
/// assert_eq!(block_size!(0), 1);
/// assert_eq!(block_size!(12), 4096);
/// ```
#[macro_export]
macro_rules! block_size {
  ($order:expr) => {
    1usize << ($order)
  };
}

/// Largest order a ledger record can encode.
pub const MAX_ORDER: u8 = 64;

/// Largest order whose arena, header and ledger still fit in the address space.
pub const MAX_ARENA_ORDER: u8 = (usize::BITS - 2) as u8;

/// Order of the smallest block able to hold `size` bytes.
///
/// Requests at or below `2^min_order` are served by a minimum-order block. Larger
/// requests round up to the next power of two, so a request of exactly `2^k` bytes
/// maps to order `k`.
pub fn order_for(
  size: u32,
  min_order: u8,
) -> u8 {
  if u64::from(size) <= 1u64 << min_order {
    return min_order;
  }

  u64::from(size).next_power_of_two().trailing_zeros() as u8
}
