//! The literal C-style contract: a single process-wide allocator instance
//! guarded by a one-shot initializer, exposed as `extern "C"` functions.
//!
//! This is a thin wrapper around [`crate::allocator::Allocator`]; all the
//! interesting logic lives there. Function names (`umeminit`, `umalloc`,
//! `ufree`) mirror the allocator's own vocabulary so callers coming from
//! its C heritage recognize the surface immediately.
//!
//! Per the allocator's concurrency model there is no synchronization here:
//! these functions are synchronous, non-reentrant, and assume a single
//! thread, exactly like every other operation in this crate.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ptr;
use std::sync::OnceLock;

use crate::allocator::Allocator;
use crate::error::AllocError;
use crate::policy::Policy;

static GLOBAL: OnceLock<UnsafeCell<Option<Allocator>>> = OnceLock::new();

fn cell() -> &'static UnsafeCell<Option<Allocator>> {
  GLOBAL.get_or_init(|| UnsafeCell::new(None))
}

/// Initializes the global allocator instance over a region of at least
/// `size_of_region` usable bytes, using `allocation_algo` as the fit
/// policy (`BEST=0, WORST=1, FIRST=2, NEXT=3`).
///
/// Returns `0` on success, `-1` on failure: already initialized, an
/// invalid size or policy, or an OS mapping failure.
///
/// # Safety
///
/// Must not be called concurrently with any other function in this module
/// from another thread; the allocator is single-threaded by contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn umeminit(size_of_region: usize, allocation_algo: i32) -> i32 {
  let policy = match Policy::try_from(allocation_algo) {
    Ok(policy) => policy,
    Err(err) => {
      log::error!("umeminit: {err}");
      return -1;
    }
  };

  let slot = unsafe { &mut *cell().get() };
  if slot.is_some() {
    log::error!("umeminit: {}", AllocError::AlreadyInitialized);
    return -1;
  }

  match Allocator::new(size_of_region, policy) {
    Ok(allocator) => {
      *slot = Some(allocator);
      0
    }
    Err(err) => {
      log::error!("umeminit: {err}");
      -1
    }
  }
}

/// Allocates `size` bytes from the global allocator, or returns null if the
/// allocator isn't initialized, `size` is zero, or no block fits.
///
/// # Safety
///
/// Same single-threaded caveat as [`umeminit`]. The returned pointer is
/// valid until passed to [`ufree`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn umalloc(size: usize) -> *mut c_void {
  let slot = unsafe { &mut *cell().get() };
  match slot {
    Some(allocator) => unsafe { allocator.alloc(size) as *mut c_void },
    None => {
      log::error!("umalloc: allocator is not initialized");
      ptr::null_mut()
    }
  }
}

/// Releases a pointer previously returned by [`umalloc`]. Returns `0` on
/// success, `-1` on failure (invalid pointer, double-free, or an
/// uninitialized allocator). `ptr` may be null, which is a no-op success.
///
/// # Safety
///
/// `ptr` must be null or a pointer previously returned by [`umalloc`], not
/// yet freed. Same single-threaded caveat as [`umeminit`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ufree(ptr_in: *mut c_void) -> i32 {
  if ptr_in.is_null() {
    return 0;
  }

  let slot = unsafe { &mut *cell().get() };
  match slot {
    Some(allocator) => match unsafe { allocator.free(ptr_in as *mut u8) } {
      Ok(()) => 0,
      Err(_) => -1,
    },
    None => {
      log::error!("ufree: allocator is not initialized");
      -1
    }
  }
}

/// Prints the global allocator's free blocks to stdout. A no-op if the
/// allocator isn't initialized.
#[unsafe(no_mangle)]
pub extern "C" fn udump() {
  let slot = unsafe { &*cell().get() };
  match slot {
    Some(allocator) => allocator.dump_to_stdout(),
    None => log::warn!("udump: allocator is not initialized"),
  }
}
