//! # Slab Allocator
//!
//! Pools of equally sized objects carved out of whole pages. Each slab page
//! starts with a [`SLAB_HEADER_SIZE`]-byte header holding a 256-bit free
//! bitmap (a set bit marks a free slot) and the link to the next slab page;
//! the slots follow directly after the header.
//!
//! ```text
//! page base                                                     +4096
//! ┌──────────────────┬────────┬────────┬────────┬─────┬─────────┐
//! │ free[4] │ next   │ slot 0 │ slot 1 │ slot 2 │ ... │ (slack) │
//! └──────────────────┴────────┴────────┴────────┴─────┴─────────┘
//! ```
//!
//! Freeing only needs the object's address: masking it down to the page
//! boundary yields the header.

use crate::{PageAllocError, PageAllocator, PhysMapper};
use core::ptr::NonNull;
use kernel_memory_addresses::PAGE_SIZE;

/// Bytes reserved at the start of every slab page.
pub const SLAB_HEADER_SIZE: usize = 64;

const MAX_OBJECTS_PER_PAGE: usize = 256;

#[repr(C)]
struct SlabPageHeader {
    free: [u64; 4],
    /// Address of the next slab page, 0 at the end of the list.
    next: usize,
    _reserved: [u64; 3],
}

const _: () = assert!(size_of::<SlabPageHeader>() == SLAB_HEADER_SIZE);

pub struct SlabAllocator {
    object_size: usize,
    objects_per_page: usize,
    head: usize,
    tail: usize,
    pages: usize,
}

impl SlabAllocator {
    /// An empty pool for objects of `object_size` bytes.
    ///
    /// # Panics
    /// If `object_size` is zero or does not fit a page behind the header.
    #[must_use]
    pub const fn new(object_size: usize) -> Self {
        assert!(object_size > 0 && object_size <= PAGE_SIZE as usize - SLAB_HEADER_SIZE);
        let per_page = (PAGE_SIZE as usize - SLAB_HEADER_SIZE) / object_size;
        Self {
            object_size,
            objects_per_page: if per_page > MAX_OBJECTS_PER_PAGE {
                MAX_OBJECTS_PER_PAGE
            } else {
                per_page
            },
            head: 0,
            tail: 0,
            pages: 0,
        }
    }

    /// A pool sized for `T`.
    #[must_use]
    pub const fn of<T>() -> Self {
        Self::new(size_of::<T>())
    }

    #[must_use]
    pub const fn object_size(&self) -> usize {
        self.object_size
    }

    #[must_use]
    pub const fn objects_per_page(&self) -> usize {
        self.objects_per_page
    }

    /// Number of backing pages taken from the page allocator so far.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.pages
    }

    /// Hand out one object slot, growing the pool by one page if every
    /// existing page is full. The slot contents are unspecified.
    ///
    /// # Errors
    /// Propagates [`PageAllocError`] if a new page is needed and none is left.
    pub fn alloc(
        &mut self,
        mapper: &dyn PhysMapper,
        frames: &mut PageAllocator,
    ) -> Result<NonNull<u8>, PageAllocError> {
        if let Some(ptr) = self.try_alloc() {
            return Ok(ptr);
        }

        let pa = frames.try_alloc(1)?;
        mapper.zero_page(pa);
        let page = mapper.phys_to_ptr(pa) as usize;
        let header = unsafe { &mut *(page as *mut SlabPageHeader) };
        for slot in 0..self.objects_per_page {
            header.free[slot / 64] |= 1 << (slot % 64);
        }

        // Append, so that freed slots in older pages are found first.
        if self.tail == 0 {
            self.head = page;
        } else {
            unsafe { (*(self.tail as *mut SlabPageHeader)).next = page };
        }
        self.tail = page;
        self.pages += 1;

        match self.try_alloc() {
            Some(ptr) => Ok(ptr),
            None => panic!("Slab allocation unexpectedly failed"),
        }
    }

    fn try_alloc(&mut self) -> Option<NonNull<u8>> {
        let mut page = self.head;
        while page != 0 {
            let header = unsafe { &mut *(page as *mut SlabPageHeader) };
            if header.free != [0; 4] {
                for (word_index, word) in header.free.iter_mut().enumerate() {
                    if *word == 0 {
                        continue;
                    }
                    let bit = word.trailing_zeros() as usize;
                    *word &= !(1 << bit);
                    let slot = word_index * 64 + bit;
                    let addr = page + SLAB_HEADER_SIZE + slot * self.object_size;
                    return NonNull::new(addr as *mut u8);
                }
            }
            page = header.next;
        }
        None
    }

    /// Return a slot obtained from [`alloc`](Self::alloc).
    ///
    /// # Panics
    /// If `ptr` does not point at the start of a slot.
    pub fn free(&mut self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        let page = addr & !(PAGE_SIZE as usize - 1);
        let offset = addr - page;
        if offset < SLAB_HEADER_SIZE || (offset - SLAB_HEADER_SIZE) % self.object_size != 0 {
            panic!("invalid slab free");
        }
        let slot = (offset - SLAB_HEADER_SIZE) / self.object_size;
        if slot >= self.objects_per_page {
            panic!("invalid slab free");
        }
        let header = unsafe { &mut *(page as *mut SlabPageHeader) };
        header.free[slot / 64] |= 1 << (slot % 64);
    }
}
