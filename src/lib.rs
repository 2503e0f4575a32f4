//! # Segregated Free-List Allocator
//!
//! A general-purpose dynamic memory allocator core that manages a single,
//! contiguous, unidirectionally growable heap region obtained from an
//! `sbrk`-style primitive.
//!
//! ## Overview
//!
//! Unlike a bump allocator, which can only return memory in the order it
//! handed it out, this allocator tracks free space with **boundary-tag
//! blocks** and a **segregated free-list directory**: 17 size classes, each
//! a doubly linked list of free blocks of roughly the same size. Freeing a
//! block coalesces it with any free physical neighbor and republishes the
//! merged block on the list for its new size.
//!
//! ## Block Layout
//!
//! ```text
//!   ┌────────┬──────────────────────────────┬────────┐
//!   │ header │           payload            │ footer │
//!   │  (W)   │  (size − 2W, D-aligned)      │  (W)   │
//!   └────────┴──────────────────────────────┴────────┘
//!            ▲
//!            └── block pointer (bp): returned to the caller when allocated
//! ```
//!
//! The header and footer each pack the block's total size (a multiple of 8)
//! together with a single allocation bit. A free block's payload is reused
//! to store two list links (previous/next in its size class), which is why
//! the minimum block size is `3 * DSIZE = 24` bytes.
//!
//! ## Heap Region
//!
//! ```text
//!   ┌─────┬───────────┬──────────┬───────────────────────┬──────────┐
//!   │ pad │ directory │ prologue │     block region      │ epilogue │
//!   │ (W) │ (alloc)   │ (D,alloc)│ (allocated/free blocks)│ (W,alloc)│
//!   └─────┴───────────┴──────────┴───────────────────────┴──────────┘
//! ```
//!
//! The directory, prologue and epilogue are laid down once by
//! [`heap::Heap::init`] and are never coalesced or placed on a free list —
//! `block::prev_alloc` naturally reports the prologue as allocated, which
//! is what lets [`heap::Heap`] coalesce the first real block without
//! special-casing it.
//!
//! ## Modules
//!
//! - [`block`] — boundary-tag encoding and free-list link accessors (the
//!   only module that interprets raw heap bytes as size/alloc words or
//!   links).
//! - [`directory`] — the 17-slot segregated free-list directory and the
//!   size-to-class mapping.
//! - [`freelist`] — O(1) insert/remove on a class's doubly linked list.
//! - [`provider`] — the [`provider::PageProvider`] trait and its
//!   `sbrk`-backed and in-memory implementations.
//! - [`heap`] — heap initialization, extension, coalescing, placement, fit
//!   search, and the allocate/free/reallocate/calloc operations.
//! - [`checker`] — the consistency predicate used by tests.
//!
//! ## Public ABI
//!
//! The four free functions below operate on a thread-local [`heap::Heap`]
//! backed by [`provider::SbrkPageProvider`], lazily initialized on first
//! use. They follow the classical malloc family's sentinel-return
//! contract: out-of-memory and zero-size requests are signaled by a null
//! pointer, never a panic.
//!
//! ```rust,ignore
//! use segalloc::{allocate, free, reallocate};
//!
//! unsafe {
//!     let p = allocate(64);
//!     assert!(!p.is_null());
//!     let p = reallocate(p, 128);
//!     free(p);
//! }
//! ```
//!
//! ## Safety
//!
//! Every module below `heap` performs raw pointer arithmetic on the heap's
//! own bytes and is marked `unsafe` accordingly. Callers of the public ABI
//! must uphold the same contract as C's `malloc`/`free`/`realloc`: no
//! double frees, no use-after-free, no freeing of a pointer this allocator
//! did not return.

use std::cell::RefCell;

pub mod align;
mod block;
pub mod checker;
pub mod directory;
mod freelist;
pub mod heap;
pub mod provider;

pub use checker::HeapCheck;
pub use heap::Heap;
pub use provider::{PageProvider, ProviderError, SbrkPageProvider, VecPageProvider};

/// Header/footer word size and the unit of `sbrk` growth requests.
pub const WSIZE: usize = 4;
/// Double-word size: the allocator's alignment unit and list-link width.
pub const DSIZE: usize = 8;

thread_local! {
  static HEAP: RefCell<Option<Heap<SbrkPageProvider>>> = const { RefCell::new(None) };
}

/// Runs `f` against the calling thread's lazily initialized heap.
///
/// A `thread_local` singleton rather than a `static mut` or a process-wide
/// `Mutex`: `SbrkPageProvider` wraps the one `sbrk` break a process has, so
/// letting every thread share a single `Heap` would need external locking
/// anyway (the core is specified single-threaded). Giving each thread its
/// own heap sidesteps that entirely — at the cost of each thread claiming
/// its own slice of the break independently.
fn with_heap<R>(f: impl FnOnce(&mut Heap<SbrkPageProvider>) -> R) -> R {
  HEAP.with(|cell| {
    let mut slot = cell.borrow_mut();
    let heap = slot.get_or_insert_with(|| {
      Heap::init(SbrkPageProvider::new()).expect("failed to initialize heap: sbrk refused the initial extension")
    });
    f(heap)
  })
}

/// Allocates `size` bytes, returning a double-word-aligned pointer, or
/// null if `size` is 0 or the heap could not be grown.
pub fn allocate(size: usize) -> *mut u8 {
  with_heap(|heap| heap.allocate(size))
}

/// Releases a previously allocated block. A no-op on a null pointer.
///
/// # Safety
/// `ptr`, if non-null, must have been returned by [`allocate`],
/// [`reallocate`] or [`calloc`] on this thread, and not already freed.
pub unsafe fn free(ptr: *mut u8) {
  with_heap(|heap| unsafe { heap.free(ptr) })
}

/// Resizes a previously allocated block, copying its contents if it moves.
///
/// # Safety
/// `ptr`, if non-null, must have been returned by [`allocate`],
/// [`reallocate`] or [`calloc`] on this thread, and not already freed.
pub unsafe fn reallocate(ptr: *mut u8, size: usize) -> *mut u8 {
  with_heap(|heap| unsafe { heap.reallocate(ptr, size) })
}

/// Allocates space for `n` elements of `size` bytes each and zeroes it.
pub fn calloc(n: usize, size: usize) -> *mut u8 {
  with_heap(|heap| heap.calloc(n, size))
}

/// Runs the consistency checker over the calling thread's heap.
///
/// Mainly useful from tests and the demo binary; the public ABI above
/// never calls this itself.
pub fn check() -> Result<(), HeapCheck> {
  with_heap(|heap| heap.check())
}
