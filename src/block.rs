//! Boundary-tag block encoding.
//!
//! Every block in the heap — allocated or free — has the form
//! `[ header word | payload … | footer word ]`. A "block pointer" (`bp`)
//! always names the first byte of the payload, never the header. The
//! header lives at `bp - WSIZE` and the footer at `bp + size - DSIZE`.
//!
//! This module is the only place that dereferences raw heap bytes as
//! size/alloc words or list links. Every function here is `unsafe`: the
//! caller must guarantee `bp` is the payload pointer of a real block
//! whose header is readable (true for any bp inside the block region,
//! since the heap is always framed by the prologue and epilogue
//! sentinels).

use std::ptr;

use crate::{DSIZE, WSIZE};

/// Packs a block size and allocation bit into a single header/footer word.
///
/// `size` must already be a multiple of 8 (its low 3 bits are reused by
/// nothing here, but callers rely on `size & !0x7` to recover it).
fn pack(size: usize, alloc: bool) -> u32 {
  (size as u32) | (alloc as u32)
}

/// Extracts the size field from a packed header/footer word.
fn size_of_word(word: u32) -> usize {
  (word & !0x7) as usize
}

/// Extracts the allocation bit from a packed header/footer word.
fn alloc_of_word(word: u32) -> bool {
  (word & 0x1) != 0
}

/// Address of `bp`'s header word.
pub unsafe fn header_addr(bp: *mut u8) -> *mut u32 {
  unsafe { bp.sub(WSIZE) as *mut u32 }
}

/// Address of `bp`'s footer word, given the block's (already known) size.
pub unsafe fn footer_addr(bp: *mut u8, size: usize) -> *mut u32 {
  unsafe { bp.add(size).sub(DSIZE) as *mut u32 }
}

/// Reads the raw header word at `bp`.
pub unsafe fn read_header(bp: *mut u8) -> u32 {
  unsafe { ptr::read(header_addr(bp)) }
}

/// Reads the block size encoded in `bp`'s header.
pub unsafe fn size(bp: *mut u8) -> usize {
  unsafe { size_of_word(read_header(bp)) }
}

/// Reads the allocation bit encoded in `bp`'s header.
pub unsafe fn is_allocated(bp: *mut u8) -> bool {
  unsafe { alloc_of_word(read_header(bp)) }
}

/// Reads the footer word belonging to `bp`'s block (size taken from the header).
pub unsafe fn read_footer(bp: *mut u8) -> u32 {
  unsafe {
    let sz = size(bp);
    ptr::read(footer_addr(bp, sz))
  }
}

/// Writes matching header and footer words for `bp`, stamping `size` and `alloc`.
///
/// This is the only primitive that *creates* a block boundary tag; every
/// other mutation of header/footer state in this crate routes through it
/// so header and footer can never drift apart.
pub unsafe fn set_block(bp: *mut u8, size: usize, alloc: bool) {
  unsafe {
    let word = pack(size, alloc);
    ptr::write(header_addr(bp), word);
    ptr::write(footer_addr(bp, size), word);
  }
}

/// Writes only the allocation bit of `bp`'s header and footer, leaving size untouched.
pub unsafe fn set_alloc(bp: *mut u8, alloc: bool) {
  unsafe {
    let sz = size(bp);
    set_block(bp, sz, alloc);
  }
}

/// The single-word epilogue: size 0, allocation bit set, no footer.
pub unsafe fn write_epilogue(header_at: *mut u8) {
  unsafe {
    ptr::write(header_at as *mut u32, pack(0, true));
  }
}

/// Block pointer of the block physically following `bp`.
pub unsafe fn next_block(bp: *mut u8) -> *mut u8 {
  unsafe { bp.add(size(bp)) }
}

/// Whether the block physically following `bp` is allocated (reads only its header).
pub unsafe fn next_alloc(bp: *mut u8) -> bool {
  unsafe { is_allocated(next_block(bp)) }
}

/// Block pointer of the block physically preceding `bp`, found via its footer.
///
/// Valid as long as `bp` is not the first block in the region — the
/// prologue's own footer makes this read safe even for the first real
/// block, since the prologue always precedes it.
pub unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
  unsafe {
    let prev_footer = bp.sub(DSIZE) as *mut u32;
    let prev_size = size_of_word(ptr::read(prev_footer));
    bp.sub(prev_size)
  }
}

/// Whether the block physically preceding `bp` is allocated (reads only its footer).
pub unsafe fn prev_alloc(bp: *mut u8) -> bool {
  unsafe {
    let prev_footer = bp.sub(DSIZE) as *mut u32;
    alloc_of_word(ptr::read(prev_footer))
  }
}

/// Offset of the previous-in-list link within a free block's payload.
const PREV_LINK_OFFSET: usize = 0;
/// Offset of the next-in-list link within a free block's payload.
const NEXT_LINK_OFFSET: usize = DSIZE;

/// Reads the previous-in-free-list link stored in `bp`'s payload.
pub unsafe fn get_prev_link(bp: *mut u8) -> *mut u8 {
  unsafe { ptr::read(bp.add(PREV_LINK_OFFSET) as *mut *mut u8) }
}

/// Writes the previous-in-free-list link into `bp`'s payload.
pub unsafe fn set_prev_link(bp: *mut u8, link: *mut u8) {
  unsafe { ptr::write(bp.add(PREV_LINK_OFFSET) as *mut *mut u8, link) }
}

/// Reads the next-in-free-list link stored in `bp`'s payload.
pub unsafe fn get_next_link(bp: *mut u8) -> *mut u8 {
  unsafe { ptr::read(bp.add(NEXT_LINK_OFFSET) as *mut *mut u8) }
}

/// Writes the next-in-free-list link into `bp`'s payload.
pub unsafe fn set_next_link(bp: *mut u8, link: *mut u8) {
  unsafe { ptr::write(bp.add(NEXT_LINK_OFFSET) as *mut *mut u8, link) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn with_buf<F: FnOnce(*mut u8)>(len: usize, f: F) {
    let mut buf = vec![0u8; len];
    // Leave room to read one word before the region, as header/footer
    // probes occasionally look one word to the left (prev_block/prev_alloc).
    let bp = unsafe { buf.as_mut_ptr().add(WSIZE) };
    f(bp);
  }

  #[test]
  fn pack_unpack_roundtrip() {
    for &(sz, alloc) in &[(24usize, true), (24, false), (4096, true), (0, true)] {
      let w = pack(sz, alloc);
      assert_eq!(size_of_word(w), sz);
      assert_eq!(alloc_of_word(w), alloc);
    }
  }

  #[test]
  fn set_block_header_equals_footer() {
    with_buf(64, |bp| unsafe {
      set_block(bp, 32, true);
      assert_eq!(read_header(bp), read_footer(bp));
      assert_eq!(size(bp), 32);
      assert!(is_allocated(bp));
    });
  }

  #[test]
  fn set_alloc_preserves_size() {
    with_buf(64, |bp| unsafe {
      set_block(bp, 40, true);
      set_alloc(bp, false);
      assert_eq!(size(bp), 40);
      assert!(!is_allocated(bp));
      assert_eq!(read_header(bp), read_footer(bp));
    });
  }

  #[test]
  fn next_block_steps_by_size() {
    with_buf(128, |bp| unsafe {
      set_block(bp, 32, true);
      let nxt = next_block(bp);
      assert_eq!(nxt, bp.add(32));
    });
  }

  #[test]
  fn free_list_links_roundtrip() {
    with_buf(64, |bp| unsafe {
      set_block(bp, 32, false);
      let fake_prev = bp.add(1000);
      let fake_next = bp.add(2000);
      set_prev_link(bp, fake_prev);
      set_next_link(bp, fake_next);
      assert_eq!(get_prev_link(bp), fake_prev);
      assert_eq!(get_next_link(bp), fake_next);
    });
  }
}
