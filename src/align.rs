//! Byte-level alignment helpers.
//!
//! The allocator never deals with an alignment stronger than the machine
//! word: every payload size and every caller-visible pointer is rounded up
//! to an 8-byte boundary. This is the same bit trick the crate's original
//! alignment macro used, fixed to a constant instead of a caller-supplied
//! one, since the allocator contract does not take an alignment parameter.

const ALIGNMENT: usize = 8;

/// Rounds `value` up to the next multiple of 8.
pub(crate) const fn round_up_8(value: usize) -> usize {
  (value + (ALIGNMENT - 1)) & !(ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rounds_up_to_next_multiple_of_eight() {
    assert_eq!(round_up_8(0), 0);
    assert_eq!(round_up_8(1), 8);
    assert_eq!(round_up_8(7), 8);
    assert_eq!(round_up_8(8), 8);
    assert_eq!(round_up_8(9), 16);
    assert_eq!(round_up_8(100), 104);
    assert_eq!(round_up_8(128), 128);
  }
}
