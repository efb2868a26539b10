//! The two fixed-layout records every block is built from.
//!
//! A block is a contiguous subrange of the [`crate::region::Region`] laid
//! out as `[Link][Header][payload...]`. `Link` and `Header` are `repr(C)`
//! so their sizes are load-bearing: the seed scenarios in the allocator's
//! test suite are written against `LINK_SIZE` and `HEADER_SIZE` rather than
//! hardcoded numbers, since those sizes are a property of this
//! implementation, not of the contract itself.

use std::mem;

/// Sentinel for "no block" in a [`Link`]'s `prev`/`next` fields. The region
/// is never anywhere close to `usize::MAX` bytes, so this is safe to use as
/// an out-of-band value without an `Option<usize>` (which would need a
/// niche we can't guarantee across an arbitrary offset).
pub(crate) const NULL: usize = usize::MAX;

/// Fixed 32-bit sentinel every live header carries. `free` refuses to
/// operate on a block whose header doesn't carry it.
pub(crate) const MAGIC: u32 = 0x1234_5678;

/// The in-band metadata threading the address-ordered block list together.
/// Sits immediately before a block's [`Header`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Link {
  /// Offset of the previous block's link record, or [`NULL`].
  pub prev: usize,
  /// Offset of the next block's link record, or [`NULL`].
  pub next: usize,
  /// Offset of this block's header, immediately following this link
  /// record.
  pub header: usize,
}

/// The in-band metadata describing a block's payload.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
  /// Payload bytes usable by the caller, excludes this header and the
  /// preceding link record.
  pub size: usize,
  /// Non-zero when the block is free. Stored as `u32` rather than `bool`
  /// to keep the struct's layout free of padding-related surprises.
  pub is_free: u32,
  /// Must equal [`MAGIC`] for the block to be considered valid.
  pub magic: u32,
}

pub(crate) const LINK_SIZE: usize = mem::size_of::<Link>();
pub(crate) const HEADER_SIZE: usize = mem::size_of::<Header>();

/// The smallest payload a block may carry. A split that would leave a
/// remainder payload smaller than this is skipped (invariant 6).
pub(crate) const MIN_PAYLOAD: usize = 8;
