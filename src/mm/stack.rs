//! Kernel Stack Pool
//!
//! Uses `linked_list_allocator` to carve fixed-size kernel stacks out of a
//! region reserved at boot. Every process owns one stack from spawn until
//! it is reaped.
//!
//! # Security Considerations
//! - Stacks are zeroed before being handed out
//! - Exhaustion is reported as ENOMEM, never a panic

use core::alloc::Layout;
use core::ptr::NonNull;

use linked_list_allocator::LockedHeap;

use crate::config::KERNEL_STACK_ALIGN;
use crate::errno::Errno;

/// A kernel stack owned by one process.
///
/// Stored as plain addresses so the owning record stays `Send`.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelStack {
    base: usize,
    size: usize,
}

impl KernelStack {
    /// Lowest address of the stack.
    #[inline]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Initial stack pointer (stacks grow down).
    #[inline]
    pub fn top(&self) -> usize {
        self.base + self.size
    }

    /// Stack size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Allocator for kernel stacks.
pub struct StackPool {
    heap: LockedHeap,
    stack_size: usize,
}

impl StackPool {
    /// Build a pool over `region`.
    ///
    /// The region is leaked to the pool for the lifetime of the kernel.
    pub fn new(region: &'static mut [u8], stack_size: usize) -> Self {
        let heap = LockedHeap::empty();
        // SAFETY:
        // - `region` is a unique 'static borrow, nothing else touches it
        // - the pool is the only user of this heap
        unsafe {
            heap.lock().init(region.as_mut_ptr(), region.len());
        }
        Self { heap, stack_size }
    }

    fn layout(&self) -> Result<Layout, Errno> {
        Layout::from_size_align(self.stack_size, KERNEL_STACK_ALIGN).map_err(|_| Errno::Einval)
    }

    /// Allocate a zeroed kernel stack.
    pub fn allocate(&self) -> Result<KernelStack, Errno> {
        let layout = self.layout()?;
        let ptr = self
            .heap
            .lock()
            .allocate_first_fit(layout)
            .map_err(|_| Errno::Enomem)?;
        // SAFETY: the allocation is `stack_size` bytes and exclusively ours
        unsafe {
            core::ptr::write_bytes(ptr.as_ptr(), 0, self.stack_size);
        }
        Ok(KernelStack {
            base: ptr.as_ptr() as usize,
            size: self.stack_size,
        })
    }

    /// Return a stack to the pool.
    pub fn release(&self, stack: KernelStack) {
        let Ok(layout) = self.layout() else { return };
        let Some(ptr) = NonNull::new(stack.base as *mut u8) else {
            return;
        };
        // SAFETY: `stack` was produced by `allocate` on this pool with the
        // same layout, and ownership is consumed here.
        unsafe {
            self.heap.lock().deallocate(ptr, layout);
        }
    }

    /// Bytes still available in the pool.
    pub fn free_bytes(&self) -> usize {
        self.heap.lock().free()
    }
}
