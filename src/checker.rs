//! The heap-consistency predicate.
//!
//! A pure observer: it never mutates the heap. It walks the block region
//! once (prologue to epilogue) and every free list once, then
//! reconciles the two counts. Every invariant in the data model has a
//! corresponding check here, named by the [`HeapCheck`] variant it
//! raises on failure.

use std::collections::HashSet;
use std::fmt;

use crate::block;
use crate::directory::{self, Directory};
use crate::heap::MIN_BLOCK_SIZE;
use crate::DSIZE;

/// The specific heap invariant a failed check violates, naming the
/// offending block (by raw address, for display only — never
/// dereferenced after the check returns) or free-list index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCheck {
  /// A block's header word did not match its footer word.
  HeaderFooterMismatch { addr: usize },
  /// A block pointer was not a multiple of `DSIZE`.
  Misaligned { addr: usize },
  /// A non-sentinel block's size was below `MIN_BLOCK_SIZE` or not a multiple of 8.
  BadSize { addr: usize, size: usize },
  /// Two physically adjacent blocks were both free.
  AdjacentFree { addr: usize },
  /// A block pointer fell outside `[heap_low, heap_high]`.
  OutOfBounds { addr: usize },
  /// A free block sat on a list other than the one `class_of` names for its size.
  WrongClass { addr: usize, expected: usize, actual: usize },
  /// A free list's doubly linked structure was inconsistent
  /// (`next(prev(x)) != x` or `prev(next(x)) != x`).
  BrokenLink { addr: usize },
  /// A free list contained a cycle back to a node already visited.
  ListCycle { addr: usize },
  /// The number of free blocks seen by the physical walk did not match
  /// the sum of free-list lengths.
  CountMismatch { walked: usize, listed: usize },
  /// The prologue or epilogue sentinel did not carry the expected size/alloc bits.
  SentinelViolation { what: &'static str },
}

impl fmt::Display for HeapCheck {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HeapCheck::HeaderFooterMismatch { addr } => {
        write!(f, "block at {addr:#x}: header does not match footer")
      }
      HeapCheck::Misaligned { addr } => write!(f, "block pointer {addr:#x} is not double-word aligned"),
      HeapCheck::BadSize { addr, size } => {
        write!(f, "block at {addr:#x} has invalid size {size} (must be a multiple of 8, >= {MIN_BLOCK_SIZE})")
      }
      HeapCheck::AdjacentFree { addr } => {
        write!(f, "block at {addr:#x} and its successor are both free")
      }
      HeapCheck::OutOfBounds { addr } => write!(f, "pointer {addr:#x} lies outside the heap"),
      HeapCheck::WrongClass { addr, expected, actual } => {
        write!(f, "free block at {addr:#x} sits on list {actual}, but belongs on list {expected}")
      }
      HeapCheck::BrokenLink { addr } => write!(f, "free list is broken at node {addr:#x}"),
      HeapCheck::ListCycle { addr } => write!(f, "free list cycles back to already-visited node {addr:#x}"),
      HeapCheck::CountMismatch { walked, listed } => {
        write!(f, "physical walk found {walked} free blocks but free lists total {listed}")
      }
      HeapCheck::SentinelViolation { what } => write!(f, "sentinel violation: {what}"),
    }
  }
}

impl std::error::Error for HeapCheck {}

/// The raw pointers the checker needs, decoupled from `Heap`'s private fields.
pub struct HeapSnapshot {
  pub directory: Directory,
  pub first_block: *mut u8,
  pub epilogue: *mut u8,
  pub heap_low: *mut u8,
  pub heap_high: *mut u8,
}

impl HeapSnapshot {
  fn in_bounds(&self, p: *mut u8) -> bool {
    (p as usize) >= (self.heap_low as usize) && (p as usize) <= (self.heap_high as usize)
  }
}

/// Runs every §3 invariant check, silently.
pub fn check(snap: &HeapSnapshot) -> Result<(), HeapCheck> {
  run(snap)
}

/// Runs every §3 invariant check, printing the failure (if any) to stderr.
pub fn check_verbose(snap: &HeapSnapshot) -> Result<(), HeapCheck> {
  run(snap).inspect_err(|err| eprintln!("heap consistency check failed: {err}"))
}

fn run(snap: &HeapSnapshot) -> Result<(), HeapCheck> {
  let walked_free = walk_blocks(snap)?;
  let listed_free = walk_free_lists(snap)?;
  if walked_free != listed_free {
    return Err(HeapCheck::CountMismatch { walked: walked_free, listed: listed_free });
  }
  Ok(())
}

/// Linear walk from the first block in the region to the epilogue.
/// Returns the number of free blocks encountered.
fn walk_blocks(snap: &HeapSnapshot) -> Result<usize, HeapCheck> {
  unsafe {
    // `snap.epilogue` is the epilogue's header address directly (it has no
    // payload), so its word is read without going through a `bp`.
    let epilogue_word = std::ptr::read(snap.epilogue as *mut u32);
    if epilogue_word != 1 {
      return Err(HeapCheck::SentinelViolation { what: "epilogue must have size 0 and be allocated" });
    }

    let prologue_bp = block::prev_block(snap.first_block);
    if !block::is_allocated(prologue_bp) || block::size(prologue_bp) != DSIZE {
      return Err(HeapCheck::SentinelViolation { what: "prologue must have size DSIZE and be allocated" });
    }

    let mut bp = snap.first_block;
    let mut free_count = 0usize;
    let mut prev_was_free = false;

    while (bp as *mut u8) != snap.epilogue.add(4) {
      if (bp as usize) % DSIZE != 0 {
        return Err(HeapCheck::Misaligned { addr: bp as usize });
      }
      if !snap.in_bounds(bp) {
        return Err(HeapCheck::OutOfBounds { addr: bp as usize });
      }

      let header = block::read_header(bp);
      let footer = block::read_footer(bp);
      if header != footer {
        return Err(HeapCheck::HeaderFooterMismatch { addr: bp as usize });
      }

      let size = block::size(bp);
      if size % 8 != 0 || size < MIN_BLOCK_SIZE {
        return Err(HeapCheck::BadSize { addr: bp as usize, size });
      }

      let is_free = !block::is_allocated(bp);
      if is_free {
        if prev_was_free {
          return Err(HeapCheck::AdjacentFree { addr: bp as usize });
        }
        free_count += 1;
      }
      prev_was_free = is_free;

      bp = block::next_block(bp);
    }

    Ok(free_count)
  }
}

/// Walks every free list, validating linkage and class membership.
/// Returns the total number of nodes seen across all lists.
fn walk_free_lists(snap: &HeapSnapshot) -> Result<usize, HeapCheck> {
  unsafe {
    let mut total = 0usize;
    for k in 1..=directory::NUM_CLASSES {
      let mut seen: HashSet<usize> = HashSet::new();
      let mut prev: *mut u8 = std::ptr::null_mut();
      let mut bp = snap.directory.head(k);

      while !bp.is_null() {
        if !seen.insert(bp as usize) {
          return Err(HeapCheck::ListCycle { addr: bp as usize });
        }
        if !snap.in_bounds(bp) {
          return Err(HeapCheck::OutOfBounds { addr: bp as usize });
        }
        if block::is_allocated(bp) {
          return Err(HeapCheck::BrokenLink { addr: bp as usize });
        }

        let actual_prev = block::get_prev_link(bp);
        if actual_prev != prev {
          return Err(HeapCheck::BrokenLink { addr: bp as usize });
        }

        let size = block::size(bp);
        let expected = directory::class_of(size);
        if expected != k {
          return Err(HeapCheck::WrongClass { addr: bp as usize, expected, actual: k });
        }

        total += 1;
        prev = bp;
        bp = block::get_next_link(bp);
      }
    }
    Ok(total)
  }
}
