//! Integration tests driving the public `Heap` API against a fixed-capacity
//! in-memory page provider, asserting the consistency checker after every
//! mutating call.

use segalloc::heap::Heap;
use segalloc::provider::VecPageProvider;

fn fresh_heap() -> Heap<VecPageProvider> {
  Heap::init(VecPageProvider::with_capacity(1 << 20)).unwrap()
}

#[test]
fn scenario_one_byte_allocation_yields_a_min_block() {
  let mut heap = fresh_heap();
  let p = heap.allocate(1);
  assert!(!p.is_null());
  assert_eq!(p as usize % 8, 0);
  heap.check().unwrap();
}

#[test]
fn scenario_two_allocations_freed_coalesce_to_one_block() {
  let mut heap = fresh_heap();
  let p = heap.allocate(100);
  let q = heap.allocate(100);
  unsafe {
    heap.free(p);
    heap.free(q);
  }
  heap.check().unwrap();
}

#[test]
fn scenario_three_allocations_free_middle_then_left_then_right() {
  let mut heap = fresh_heap();
  let p = heap.allocate(24);
  let q = heap.allocate(24);
  let r = heap.allocate(24);

  unsafe { heap.free(q) };
  heap.check().unwrap();

  unsafe { heap.free(p) };
  heap.check().unwrap();

  unsafe { heap.free(r) };
  heap.check().unwrap();
}

#[test]
fn scenario_reallocate_shrink_is_in_place() {
  let mut heap = fresh_heap();
  let p = heap.allocate(16);
  let q = unsafe { heap.reallocate(p, 8) };
  assert_eq!(p, q);
  heap.check().unwrap();
}

#[test]
fn scenario_reallocate_grow_preserves_bytes_and_frees_old_block() {
  let mut heap = fresh_heap();
  let p = heap.allocate(16);
  unsafe { std::ptr::write_bytes(p, 0xAB, 16) };

  let q = unsafe { heap.reallocate(p, 4096) };
  assert_ne!(p, q);

  let bytes = unsafe { std::slice::from_raw_parts(q, 16) };
  assert!(bytes.iter().all(|&b| b == 0xAB));
  heap.check().unwrap();
}

#[test]
fn scenario_varied_sizes_freed_in_reverse_order_converge_toward_one_block() {
  let mut heap = fresh_heap();
  let sizes = [24usize, 48, 1000, 32, 2048, 48];
  let ptrs: Vec<_> = sizes.iter().map(|&s| heap.allocate(s)).collect();
  assert!(ptrs.iter().all(|p| !p.is_null()));

  for p in ptrs.iter().rev() {
    unsafe { heap.free(*p) };
    heap.check().unwrap();
  }

  // Everything should have coalesced back into one free span: a single
  // allocation sized to consume it should succeed without the heap having
  // to grow further than it already has.
  let (_, high_before) = heap.bounds();
  let reclaim = heap.allocate(sizes.iter().sum::<usize>());
  assert!(!reclaim.is_null());
  let (_, high_after) = heap.bounds();
  assert_eq!(high_before, high_after, "heap should not have needed to grow to satisfy the reclaim");
  heap.check().unwrap();
}

/// Small, deterministic xorshift generator — good enough to drive a
/// randomized allocate/free trace without pulling in a dependency.
struct XorShift(u64);

impl XorShift {
  fn next_u64(&mut self) -> u64 {
    let mut x = self.0;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    self.0 = x;
    x
  }

  fn range(&mut self, lo: usize, hi: usize) -> usize {
    lo + (self.next_u64() as usize) % (hi - lo)
  }
}

#[test]
fn randomized_allocate_free_trace_stays_consistent() {
  let mut heap = Heap::init(VecPageProvider::with_capacity(1 << 22)).unwrap();
  let mut rng = XorShift(0x9e3779b97f4a7c15);
  let mut live: Vec<*mut u8> = Vec::new();

  for round in 0..500 {
    if live.is_empty() || rng.range(0, 3) != 0 {
      let size = rng.range(1, 2048);
      let p = heap.allocate(size);
      if !p.is_null() {
        unsafe { std::ptr::write_bytes(p, (round % 251) as u8, 1) };
        live.push(p);
      }
    } else {
      let idx = rng.range(0, live.len());
      let p = live.swap_remove(idx);
      unsafe { heap.free(p) };
    }
    heap.check().unwrap();
  }

  for p in live {
    unsafe { heap.free(p) };
  }
  heap.check().unwrap();
}
