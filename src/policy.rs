//! Fit-selection policy, the one piece of per-allocator configuration.

use crate::error::AllocError;

/// Which strategy [`crate::allocator::Allocator`] uses to pick a free block
/// large enough to satisfy a request.
///
/// The discriminants are part of the external contract (`BEST=0`, `WORST=1`,
/// `FIRST=2`, `NEXT=3`) so they stay stable across implementations and are
/// what the FFI surface in [`crate::ffi`] accepts as a plain `i32`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
  Best = 0,
  Worst = 1,
  First = 2,
  Next = 3,
}

impl TryFrom<i32> for Policy {
  type Error = AllocError;

  fn try_from(value: i32) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(Policy::Best),
      1 => Ok(Policy::Worst),
      2 => Ok(Policy::First),
      3 => Ok(Policy::Next),
      _ => Err(AllocError::InvalidArgument),
    }
  }
}
