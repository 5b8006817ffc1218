// Kernel heap
//
// Boot heap backed by a static region in the kernel image, handed to
// linked_list_allocator. Large enough for task stacks, VFS nodes, and
// filesystem buffers during bring-up.

use core::sync::atomic::{AtomicBool, Ordering};
use linked_list_allocator::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[repr(align(4096))]
struct HeapArea([u8; HEAP_SIZE]);

static mut HEAP_AREA: HeapArea = HeapArea([0; HEAP_SIZE]);

static HEAP_INIT_DONE: AtomicBool = AtomicBool::new(false);

pub fn init_heap() {
    if HEAP_INIT_DONE.swap(true, Ordering::SeqCst) {
        return;
    }
    unsafe {
        let base = core::ptr::addr_of_mut!(HEAP_AREA) as *mut u8;
        ALLOCATOR.lock().init(base, HEAP_SIZE);
    }
    crate::info!("heap: {} KiB at {:p}", HEAP_SIZE / 1024, core::ptr::addr_of!(HEAP_AREA));
}

pub const fn heap_total_size() -> usize {
    HEAP_SIZE
}
