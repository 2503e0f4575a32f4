//! Free-list insert and unlink.
//!
//! Both operations are O(1) and touch only the link words and the header
//! size field — never the payload contents of an allocated neighbor.
//! Callers must guarantee `bp` is currently free and unlinked (`insert`)
//! or currently free and linked (`remove`).

use std::ptr;

use crate::block;
use crate::directory::{self, Directory};

/// Pushes `bp` onto the head of its size class's free list (LIFO).
pub unsafe fn insert(dir: Directory, bp: *mut u8) {
  unsafe {
    let k = directory::class_of(block::size(bp));
    let head = dir.head(k);
    block::set_prev_link(bp, ptr::null_mut());
    block::set_next_link(bp, head);
    if !head.is_null() {
      block::set_prev_link(head, bp);
    }
    dir.set_head(k, bp);
  }
}

/// Unlinks `bp` from whichever free list it currently sits on.
pub unsafe fn remove(dir: Directory, bp: *mut u8) {
  unsafe {
    let prev = block::get_prev_link(bp);
    let next = block::get_next_link(bp);
    if !prev.is_null() {
      block::set_next_link(prev, next);
    } else {
      let k = directory::class_of(block::size(bp));
      dir.set_head(k, next);
    }
    if !next.is_null() {
      block::set_prev_link(next, prev);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::DSIZE;

  fn make_block(buf: &mut [u8], offset: usize, size: usize) -> *mut u8 {
    let bp = unsafe { buf.as_mut_ptr().add(offset) };
    unsafe { block::set_block(bp, size, false) };
    bp
  }

  #[test]
  fn insert_and_remove_single_block() {
    let mut dir_buf = vec![0u8; directory::DIRECTORY_PAYLOAD_BYTES];
    let dir = unsafe { Directory::from_raw(dir_buf.as_mut_ptr()) };
    unsafe { dir.init_empty() };

    let mut heap_buf = vec![0u8; 256];
    let bp = make_block(&mut heap_buf, 8, 32); // class_of(32) = 2 (32/8=4)

    unsafe {
      insert(dir, bp);
      let k = directory::class_of(32);
      assert_eq!(dir.head(k), bp);
      assert!(block::get_prev_link(bp).is_null());
      assert!(block::get_next_link(bp).is_null());

      remove(dir, bp);
      assert!(dir.head(k).is_null());
    }
  }

  #[test]
  fn lifo_order_and_unlink_middle() {
    let mut dir_buf = vec![0u8; directory::DIRECTORY_PAYLOAD_BYTES];
    let dir = unsafe { Directory::from_raw(dir_buf.as_mut_ptr()) };
    unsafe { dir.init_empty() };

    let mut heap_buf = vec![0u8; 512];
    // All three blocks share a size, hence a class, so they form one list.
    let a = make_block(&mut heap_buf, 8, 5 * DSIZE);
    let b = make_block(&mut heap_buf, 8 + 5 * DSIZE, 5 * DSIZE);
    let c = make_block(&mut heap_buf, 8 + 10 * DSIZE, 5 * DSIZE);
    let k = directory::class_of(5 * DSIZE);

    unsafe {
      insert(dir, a);
      insert(dir, b);
      insert(dir, c);
      // LIFO: head is the most recently inserted.
      assert_eq!(dir.head(k), c);
      assert_eq!(block::get_next_link(c), b);
      assert_eq!(block::get_next_link(b), a);
      assert!(block::get_next_link(a).is_null());

      // Unlink the middle node and check the splice.
      remove(dir, b);
      assert_eq!(dir.head(k), c);
      assert_eq!(block::get_next_link(c), a);
      assert_eq!(block::get_prev_link(a), c);

      remove(dir, c);
      assert_eq!(dir.head(k), a);
      assert!(block::get_prev_link(a).is_null());

      remove(dir, a);
      assert!(dir.head(k).is_null());
    }
  }
}
