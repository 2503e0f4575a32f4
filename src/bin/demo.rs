//! Walks through allocate/write/free/reallocate/calloc against a
//! live `sbrk`-backed heap, printing progress after each step.
//!
//! Run with `cargo run --bin segalloc-demo`.

use segalloc::provider::{PageProvider, SbrkPageProvider};
use segalloc::Heap;

fn report(label: &str, heap: &Heap<SbrkPageProvider>) {
  let (low, high) = heap.bounds();
  match heap.check() {
    Ok(()) => println!("[{label}] heap consistent, bounds = {low:?} .. {high:?}"),
    Err(err) => eprintln!("[{label}] heap INCONSISTENT: {err}"),
  }
}

fn main() {
  let provider = SbrkPageProvider::new();
  let mut heap = Heap::init(provider).expect("sbrk refused the initial heap extension");
  let (low, high) = heap.bounds();
  println!("heap initialized, bounds = {low:?} .. {high:?}");

  let a = heap.allocate(64);
  println!("allocate(64)  -> {a:?}");
  report("after allocate(64)", &heap);

  unsafe { std::ptr::write_bytes(a, 0xAB, 64) };
  println!("wrote 64 bytes of 0xAB through the returned pointer");

  let b = heap.allocate(128);
  println!("allocate(128) -> {b:?}");
  report("after allocate(128)", &heap);

  unsafe { heap.free(a) };
  println!("free(a)");
  report("after free(a)", &heap);

  let c = unsafe { heap.reallocate(b, 4096) };
  println!("reallocate(b, 4096) -> {c:?}");
  report("after reallocate(b, 4096)", &heap);

  let d = heap.calloc(16, 8);
  println!("calloc(16, 8) -> {d:?}");
  report("after calloc(16, 8)", &heap);

  unsafe {
    heap.free(c);
    heap.free(d);
  }
  println!("freed the remaining live blocks");
  report("final", &heap);
}
