//! Host-side stand-in for physical memory.

use crate::PhysMapper;
use alloc::boxed::Box;
use alloc::vec::Vec;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};

#[repr(C, align(4096))]
struct Frame([u8; PAGE_SIZE as usize]);

/// A leaked, page-aligned heap buffer that pretends to be RAM starting at
/// [`TestPhysMemory::PHYS_BASE`].
///
/// Frames keep their alignment, so code that masks pointers down to a page
/// boundary (the slab allocator) behaves exactly as it does on the HHDM.
#[derive(Debug)]
pub struct TestPhysMemory {
    base: usize,
    len: u64,
}

impl TestPhysMemory {
    /// Fake physical address of the first byte.
    pub const PHYS_BASE: u64 = 0x10_0000;

    /// Allocate `pages` zeroed frames. The backing memory is never freed.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        let frames: Vec<Frame> = (0..pages).map(|_| Frame([0; PAGE_SIZE as usize])).collect();
        let frames = Box::leak(frames.into_boxed_slice());
        Self {
            base: frames.as_mut_ptr() as usize,
            len: pages as u64 * PAGE_SIZE,
        }
    }

    /// [`new`](Self::new), leaked to `'static` for APIs that keep the mapper.
    #[must_use]
    pub fn leak(pages: usize) -> &'static Self {
        Box::leak(Box::new(Self::new(pages)))
    }

    #[must_use]
    pub const fn phys_base(&self) -> PhysicalAddress {
        PhysicalAddress::new(Self::PHYS_BASE)
    }

    /// Size of the fake RAM in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PhysMapper for TestPhysMemory {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa.as_u64().wrapping_sub(Self::PHYS_BASE);
        assert!(offset < self.len, "{pa:?} outside of test memory");
        (self.base + offset as usize) as *mut u8
    }

    fn ptr_to_phys(&self, ptr: *const u8) -> PhysicalAddress {
        let offset = (ptr as usize).wrapping_sub(self.base) as u64;
        assert!(offset < self.len, "pointer {ptr:p} outside of test memory");
        PhysicalAddress::new(Self::PHYS_BASE + offset)
    }
}
