//! # rallocator - a free-list user-space allocator
//!
//! This crate manages one contiguous region of virtual memory, obtained
//! once from the OS via `mmap`, and serves `malloc`/`free`-style requests
//! out of it using an address-ordered, doubly-linked free list with four
//! pluggable placement policies.
//!
//! ## Overview
//!
//! ```text
//!   Region (one mmap mapping, fixed size, never grown or moved)
//!
//!   ┌────────────┬────────┬────────────┬────────┬───────────────────────┐
//!   │ Link+Header│ payload│ Link+Header│ payload│ Link+Header │ payload │
//!   │  (in use)  │        │   (free)   │        │  (in use)   │         │
//!   └────────────┴────────┴────────────┴────────┴───────────────────────┘
//!    ▲                     ▲                     ▲
//!    head                  │                      │
//!                          └── doubly-linked in address order ──┘
//! ```
//!
//! Every block carries a link record (prev/next offsets plus a pointer to
//! its header) and a header (payload size, free flag, magic sentinel).
//! Allocation splits an oversized free block in two; release marks a block
//! free and coalesces it with any address-adjacent free neighbor on
//! either side.
//!
//! ## Crate structure
//!
//! ```text
//!   rallocator
//!   ├── align      - 8-byte rounding (internal)
//!   ├── block      - Link/Header record layout (internal)
//!   ├── region     - the mmap'd backing byte range (internal)
//!   ├── policy     - BEST/WORST/FIRST/NEXT fit selection
//!   ├── error      - AllocError, the safe API's error taxonomy
//!   ├── allocator  - Allocator: the block-management engine
//!   └── ffi        - the single-global-instance C ABI (umeminit/umalloc/ufree/udump)
//! ```
//!
//! ## Quick start
//!
//! ```
//! use rallocator::{Allocator, Policy};
//!
//! let mut allocator = Allocator::new(4096, Policy::First).unwrap();
//!
//! unsafe {
//!   let p = allocator.alloc(128) as *mut u64;
//!   assert!(!p.is_null());
//!
//!   p.write(42);
//!   assert_eq!(p.read(), 42);
//!
//!   allocator.free(p as *mut u8).unwrap();
//! }
//! ```
//!
//! ## Fit policies
//!
//! | Policy | Constant | Rule |
//! |---|---|---|
//! | [`Policy::Best`] | 0 | smallest free block that still fits |
//! | [`Policy::Worst`] | 1 | largest free block |
//! | [`Policy::First`] | 2 | first free block found, in list order |
//! | [`Policy::Next`] | 3 | resumes scanning from the last block returned |
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; wrap in an
//!   external mutex for concurrent use.
//! - **One region, fixed size**: no growth, no `realloc`.
//! - **8-byte alignment only**: no stronger alignment support.
//! - **Unix-only**: requires `libc`'s `mmap`/`munmap`/`sysconf`.
//!
//! ## Safety
//!
//! This crate manages raw memory directly. [`Allocator::alloc`] and
//! [`Allocator::free`] are `unsafe`; the FFI surface in [`ffi`] inherits
//! the same obligations under an `extern "C"` calling convention.

mod align;
mod block;
mod region;

pub mod allocator;
pub mod error;
pub mod ffi;
pub mod policy;

pub use allocator::{Allocator, FreeBlockInfo};
pub use error::AllocError;
pub use policy::Policy;

/// Size in bytes of the internal link record prepended to every block.
/// Exposed so tests and callers can compute exact layout numbers instead
/// of hardcoding illustrative figures that don't match this platform.
pub const fn link_record_size() -> usize {
  block::LINK_SIZE
}

/// Size in bytes of the internal header prepended to every block's
/// payload.
pub const fn header_size() -> usize {
  block::HEADER_SIZE
}
