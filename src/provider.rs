//! The page-provider collaborator.
//!
//! The heap core never talks to the operating system directly — it asks
//! a [`PageProvider`] for more bytes and trusts the bounds it reports.
//! This keeps the hard part of the allocator (block layout, free lists,
//! coalescing) independent of how memory is actually obtained, and lets
//! tests drive the heap against a small, deterministic in-process arena
//! instead of process-wide `sbrk` state.
//!
//! `SbrkPageProvider` is the production collaborator, built on the same
//! `libc::sbrk` primitive the original bump allocator used.

use std::fmt;
use std::ptr;

use libc::{c_void, intptr_t, sbrk};

/// An error returned by a [`PageProvider`] when it cannot grow the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderError {
  /// The underlying growth primitive refused the request (out of memory,
  /// resource limits, or — for a fixed arena — simply out of space).
  OutOfMemory,
}

impl fmt::Display for ProviderError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProviderError::OutOfMemory => write!(f, "page provider could not extend the heap"),
    }
  }
}

impl std::error::Error for ProviderError {}

/// The three operations the heap core needs from a linearly growable region.
///
/// # Safety contract
///
/// Implementors must guarantee that the first byte ever returned by
/// `extend`, and every high-water mark reported thereafter, is 8-byte
/// (`DSIZE`) aligned, and that `extend` always appends memory immediately
/// after the previous high-water mark (no gaps, no reuse of freed pages).
/// The heap's sentinel bookkeeping depends on both properties.
pub trait PageProvider {
  /// Grows the region by exactly `bytes` and returns the first byte of
  /// the new span, or `Err` if the provider could not satisfy the
  /// request. `bytes` is always a positive multiple of `WSIZE`.
  fn extend(&mut self, bytes: usize) -> Result<*mut u8, ProviderError>;

  /// Inclusive lower bound of the region currently under management.
  fn heap_low(&self) -> *mut u8;

  /// Inclusive upper bound of the region currently under management.
  fn heap_high(&self) -> *mut u8;
}

/// A [`PageProvider`] backed by the process's `sbrk`-managed data segment.
///
/// This mirrors the teacher crate's own use of `libc::sbrk`: `extend`
/// moves the program break forward and returns the old break (the start
/// of the new span). Because `sbrk` is process-wide state, only one
/// `SbrkPageProvider` should be in active use by a process at a time —
/// the public free functions in this crate enforce that via a
/// thread-local singleton (see [`crate::heap`]).
#[derive(Debug, Default)]
pub struct SbrkPageProvider {
  low: *mut u8,
  high: *mut u8,
}

// `*mut u8` fields make this `!Send`/`!Sync` by default, which is exactly
// what the single-threaded, caller-synchronized model in the spec calls for.

impl SbrkPageProvider {
  /// Creates a provider with no region yet claimed; bounds are established
  /// on the first successful `extend` call.
  pub fn new() -> Self {
    Self { low: ptr::null_mut(), high: ptr::null_mut() }
  }
}

impl PageProvider for SbrkPageProvider {
  fn extend(&mut self, bytes: usize) -> Result<*mut u8, ProviderError> {
    let raw = unsafe { sbrk(bytes as intptr_t) };
    if raw == usize::MAX as *mut c_void {
      return Err(ProviderError::OutOfMemory);
    }
    let base = raw as *mut u8;
    if self.low.is_null() {
      self.low = base;
    }
    self.high = unsafe { base.add(bytes) };
    Ok(base)
  }

  fn heap_low(&self) -> *mut u8 {
    self.low
  }

  fn heap_high(&self) -> *mut u8 {
    self.high
  }
}

/// A [`PageProvider`] backed by a fixed-capacity, heap-allocated `Vec<u8>`.
///
/// Useful anywhere process-global `sbrk` state would make tests
/// order-dependent or unable to run in parallel: each `VecPageProvider`
/// owns an independent arena, so many can coexist in one process. Also
/// handy for exploring out-of-memory behavior deterministically, since
/// its capacity is fixed at construction rather than bounded by whatever
/// `RLIMIT_DATA` happens to allow.
pub struct VecPageProvider {
  // Backed by `u64` rather than `u8` so the arena's base address is
  // guaranteed 8-byte aligned, matching the `PageProvider` contract —
  // `Vec<u8>` carries no such alignment guarantee.
  arena: Vec<u64>,
  capacity_bytes: usize,
  used: usize,
}

impl VecPageProvider {
  /// Creates a provider with `capacity` bytes of backing storage.
  ///
  /// `capacity` is rounded up to a multiple of 8.
  pub fn with_capacity(capacity: usize) -> Self {
    let words = capacity.div_ceil(8);
    Self { arena: vec![0u64; words], capacity_bytes: words * 8, used: 0 }
  }

  fn base(&self) -> *mut u8 {
    self.arena.as_ptr() as *mut u8
  }
}

impl PageProvider for VecPageProvider {
  fn extend(&mut self, bytes: usize) -> Result<*mut u8, ProviderError> {
    if self.used + bytes > self.capacity_bytes {
      return Err(ProviderError::OutOfMemory);
    }
    let base = unsafe { self.base().add(self.used) };
    self.used += bytes;
    Ok(base)
  }

  fn heap_low(&self) -> *mut u8 {
    self.base()
  }

  fn heap_high(&self) -> *mut u8 {
    unsafe { self.base().add(self.used.max(1) - 1) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vec_provider_extends_contiguously() {
    let mut p = VecPageProvider::with_capacity(4096);
    let a = p.extend(64).unwrap();
    let b = p.extend(128).unwrap();
    assert_eq!(unsafe { a.add(64) }, b);
  }

  #[test]
  fn vec_provider_reports_out_of_memory() {
    let mut p = VecPageProvider::with_capacity(64);
    assert!(p.extend(32).is_ok());
    assert_eq!(p.extend(64), Err(ProviderError::OutOfMemory));
  }

  #[test]
  fn vec_provider_base_is_double_word_aligned() {
    let p = VecPageProvider::with_capacity(4096);
    assert_eq!(p.heap_low() as usize % 8, 0);
  }
}
