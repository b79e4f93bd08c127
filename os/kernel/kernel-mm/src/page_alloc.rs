//! # Physical Page Allocator
//!
//! A flat array of [`PageStatus`] tags, one per 4 KiB frame of a single RAM
//! region, stored at the start of that region. Allocation is a linear
//! first-fit scan for `n` consecutive free frames; callers free with the same
//! `n` they allocated with.

use crate::PhysMapper;
use kernel_info::memory::DEVICE_PAGE_BASE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use log::debug;

/// State of one physical frame.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PageStatus {
    /// Holds the status array itself.
    PageArray = 0,
    Free = 1,
    Used = 2,
    /// Device memory; never handed out.
    Device = 3,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PageAllocError {
    #[error("Out of physical memory")]
    OutOfMemory,
    #[error("zero-page allocation")]
    ZeroPages,
}

/// Source of single zeroed-or-not 4 KiB frames for page table construction.
///
/// Implemented by [`PageAllocator`] and by the UEFI loader's boot-services
/// allocator.
pub trait FrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;
}

pub struct PageAllocator {
    base: PhysicalAddress,
    status: &'static mut [PageStatus],
    used: usize,
}

impl PageAllocator {
    /// Take over the RAM region `[base, base + bytes)`.
    ///
    /// The first `pages / 4096 + 1` frames of the region become the status
    /// array and are tagged [`PageStatus::PageArray`]; all others start
    /// [`PageStatus::Free`].
    ///
    /// # Safety
    /// The region must be unused RAM, reachable through `mapper` for the rest
    /// of the program, and handed to exactly one allocator.
    #[must_use]
    pub unsafe fn new_in_region(mapper: &dyn PhysMapper, base: PhysicalAddress, bytes: u64) -> Self {
        let base = base.align_up::<kernel_memory_addresses::Size4K>();
        let total = (bytes / PAGE_SIZE) as usize;
        let array_pages = total * size_of::<PageStatus>() / PAGE_SIZE as usize + 1;
        assert!(total > array_pages, "memory region too small");

        let ptr = mapper.phys_to_ptr(base).cast::<PageStatus>();
        for i in 0..total {
            let tag = if i < array_pages {
                PageStatus::PageArray
            } else {
                PageStatus::Free
            };
            unsafe { ptr.add(i).write(tag) };
        }

        debug!(
            "page allocator: {total} pages at {base}, {array_pages} pages of metadata"
        );
        Self {
            base,
            status: unsafe { core::slice::from_raw_parts_mut(ptr, total) },
            used: 0,
        }
    }

    /// Allocate `n` contiguous frames.
    ///
    /// # Errors
    /// [`PageAllocError::OutOfMemory`] when no run of `n` free frames exists.
    pub fn try_alloc(&mut self, n: usize) -> Result<PhysicalAddress, PageAllocError> {
        if n == 0 {
            return Err(PageAllocError::ZeroPages);
        }

        let mut run = 0;
        let mut first = None;
        for (i, status) in self.status.iter().enumerate() {
            if *status == PageStatus::Free {
                run += 1;
                if run == n {
                    first = Some(i + 1 - n);
                    break;
                }
            } else {
                run = 0;
            }
        }

        let first = first.ok_or(PageAllocError::OutOfMemory)?;
        self.status[first..first + n].fill(PageStatus::Used);
        self.used += n;
        Ok(self.base + first as u64 * PAGE_SIZE)
    }

    /// Allocate `n` contiguous frames; running out of memory is fatal.
    pub fn alloc(&mut self, n: usize) -> PhysicalAddress {
        match self.try_alloc(n) {
            Ok(pa) => pa,
            Err(e) => panic!("{e}"),
        }
    }

    /// Return `n` frames starting at `pa`.
    ///
    /// # Panics
    /// If any of the frames lies outside the region or is not in use.
    pub fn free(&mut self, pa: PhysicalAddress, n: usize) {
        let first = self.index_of(pa);
        for status in &mut self.status[first..first + n] {
            assert!(*status == PageStatus::Used, "freeing page in state {status:?}");
            *status = PageStatus::Free;
        }
        self.used -= n;
    }

    /// Status of the frame containing `pa`.
    #[must_use]
    pub fn status(&self, pa: PhysicalAddress) -> PageStatus {
        self.status[self.index_of(pa)]
    }

    /// Frames managed, including the status array.
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.status.len()
    }

    /// Frames currently handed out.
    #[must_use]
    pub const fn used_pages(&self) -> usize {
        self.used
    }

    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    fn index_of(&self, pa: PhysicalAddress) -> usize {
        assert!(pa >= self.base, "{pa:?} below allocator region");
        let index = ((pa - self.base) / PAGE_SIZE) as usize;
        assert!(index < self.status.len(), "{pa:?} above allocator region");
        index
    }
}

impl FrameAlloc for PageAllocator {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        self.try_alloc(1).ok()
    }
}

/// Hands out virtual page ranges for MMIO windows, starting at
/// [`DEVICE_PAGE_BASE`]. The addresses are only identifiers for new
/// mappings; nothing backs them until the caller maps device memory there.
#[derive(Debug)]
pub struct DevicePageAllocator {
    next: u64,
}

impl Default for DevicePageAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl DevicePageAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: DEVICE_PAGE_BASE,
        }
    }

    pub const fn alloc(&mut self, n: usize) -> VirtualAddress {
        let va = VirtualAddress::new(self.next);
        self.next += n as u64 * PAGE_SIZE;
        va
    }
}
