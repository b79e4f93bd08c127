//! Loader memory: the global allocator over the UEFI pool and page
//! allocations that outlive boot services.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress, pages_for};
use uefi::boot::{self, AllocateType, MemoryType};

/// Rust's global allocator on top of the boot services pool.
///
/// Valid only until `ExitBootServices`. Over-allocates to honor alignment
/// and keeps the pool pointer right before the returned block.
pub struct UefiBootAllocator;

#[global_allocator]
static GLOBAL_ALLOC: UefiBootAllocator = UefiBootAllocator;

unsafe impl GlobalAlloc for UefiBootAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align().max(size_of::<usize>());
        let Some(total) = layout
            .size()
            .max(1)
            .checked_add(align)
            .and_then(|v| v.checked_add(size_of::<usize>()))
        else {
            return null_mut();
        };

        let Ok(raw) = boot::allocate_pool(MemoryType::LOADER_DATA, total) else {
            return null_mut();
        };

        let raw = raw.as_ptr();
        let aligned = (raw as usize + size_of::<usize>()).next_multiple_of(align);
        unsafe {
            ptr::write((aligned - size_of::<usize>()) as *mut usize, raw as usize);
        }
        aligned as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(block) = NonNull::new(ptr) else {
            return;
        };
        let raw = unsafe { ptr::read((block.as_ptr() as usize - size_of::<usize>()) as *const usize) };
        if let Some(raw) = NonNull::new(raw as *mut u8) {
            let _ = unsafe { boot::free_pool(raw) };
        }
    }
}

/// Whole pages the kernel inherits, typed `LOADER_DATA` so its page
/// allocator leaves them alone.
///
/// # Errors
/// When the firmware has no `bytes` worth of pages left.
pub fn allocate_loader_pages(bytes: u64) -> uefi::Result<PhysicalAddress> {
    let pages = pages_for(bytes).max(1) as usize;
    let base = boot::allocate_pages(AllocateType::AnyPages, MemoryType::LOADER_DATA, pages)?;
    Ok(PhysicalAddress::new(base.as_ptr() as u64))
}

/// The stack the trampoline switches to before jumping into the kernel.
#[derive(Debug, Clone, Copy)]
pub struct TrampolineStack {
    /// Lowest usable byte, one page above the guard page.
    pub base: PhysicalAddress,
    pub len: u64,
    /// Initial `RSP`, identity mapped.
    pub top: VirtualAddress,
}

/// Allocate `bytes` of stack plus one unmapped guard page below it.
///
/// # Errors
/// When the firmware has no pages left.
pub fn alloc_trampoline_stack(bytes: u64) -> uefi::Result<TrampolineStack> {
    let len = pages_for(bytes) * PAGE_SIZE;
    let guard = allocate_loader_pages(len + PAGE_SIZE)?;
    let base = guard + PAGE_SIZE;
    Ok(TrampolineStack {
        base,
        len,
        top: VirtualAddress::new(base.as_u64() + len),
    })
}
