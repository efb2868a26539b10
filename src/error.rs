//! Error taxonomy for the allocator's safe API.
//!
//! The FFI surface in [`crate::ffi`] collapses every variant back down to
//! the `-1`/`null` status channel the C-style contract uses; this enum only
//! exists at the Rust-idiomatic boundary ([`crate::allocator::Allocator`]).

use thiserror::Error;

/// Everything that can go wrong while initializing, allocating from, or
/// releasing memory back to an [`crate::allocator::Allocator`].
#[derive(Debug, Error)]
pub enum AllocError {
  /// `init` was called a second time without an intervening teardown.
  #[error("allocator is already initialized")]
  AlreadyInitialized,

  /// `init` was called with zero bytes or an unrecognized policy value.
  #[error("invalid argument")]
  InvalidArgument,

  /// The OS failed to satisfy the backing `mmap` request.
  #[error("OS memory mapping failed: {0}")]
  OsError(#[from] std::io::Error),

  /// `free` was given a pointer whose header magic does not match.
  #[error("pointer does not carry a valid block header")]
  InvalidPointer,

  /// `free` was given a pointer to a block that is already free.
  #[error("double free")]
  DoubleFree,
}
