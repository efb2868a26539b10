//! The backing byte range obtained once from the OS.
//!
//! A [`Region`] is a thin, `Drop`-safe wrapper around a single anonymous
//! `mmap` mapping. It knows nothing about blocks, headers, or policies; it
//! just owns `len` bytes starting at `base` and hands out checked byte
//! offsets into one fixed-size mapping that is never grown or moved.

use std::ffi::c_void;
use std::io;
use std::ptr;

use crate::error::AllocError;

/// A single contiguous, page-aligned mapping obtained from the OS exactly
/// once. Never grown, shrunk, or moved; released only on `Drop`.
pub(crate) struct Region {
  base: *mut u8,
  len: usize,
}

// The allocator's concurrency model (see the crate's top-level docs) is
// strictly single-threaded; `Region` makes no attempt at cross-thread safety
// and is deliberately left `!Send`/`!Sync` via its raw pointer field.

impl Region {
  /// Maps enough whole pages to hold at least `region_bytes + sizeof(link)`
  /// bytes, per the allocator's `init` sizing rule.
  pub(crate) fn new(region_bytes: usize, link_size: usize) -> Result<Self, AllocError> {
    let page_size = page_size();
    let pages = (region_bytes + link_size).div_ceil(page_size);
    let len = pages * page_size;

    let base = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_ANON | libc::MAP_PRIVATE,
        -1,
        0,
      )
    };

    if base == libc::MAP_FAILED {
      return Err(AllocError::OsError(io::Error::last_os_error()));
    }

    Ok(Region {
      base: base as *mut u8,
      len,
    })
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  /// Raw pointer to byte `offset` within the region. The caller is
  /// responsible for `offset <= self.len`; this is the one spot where
  /// that trust boundary lives.
  pub(crate) unsafe fn ptr_at(&self, offset: usize) -> *mut u8 {
    debug_assert!(offset <= self.len, "offset {offset} out of bounds for region of {} bytes", self.len);
    unsafe { self.base.add(offset) }
  }

  /// The absolute address of byte `offset`, for diagnostic output only.
  pub(crate) fn addr_at(&self, offset: usize) -> usize {
    self.base as usize + offset
  }

  /// Recovers the offset of a caller-visible pointer within this region,
  /// or `None` if the pointer does not land inside `[base, base+len)`.
  pub(crate) fn offset_of(&self, ptr: *const u8) -> Option<usize> {
    let base = self.base as usize;
    let addr = ptr as usize;
    if addr < base {
      return None;
    }
    let offset = addr - base;
    if offset > self.len {
      return None;
    }
    Some(offset)
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base as *mut c_void, self.len);
    }
  }
}

fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size <= 0 { 4096 } else { size as usize }
}
