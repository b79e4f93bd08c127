//! # Kernel Heap
//!
//! `GlobalAlloc` front end for the kernel. Small layouts are served from
//! power-of-two size classes backed by [`SlabAllocator`]s; anything larger
//! than the biggest class (or more strictly aligned than a slab slot can
//! guarantee) takes whole page runs from the [`PageAllocator`].

use crate::{PageAllocator, PhysMapper, SLAB_HEADER_SIZE, SlabAllocator};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{NonNull, null_mut};
use kernel_memory_addresses::{PAGE_SIZE, pages_for};
use kernel_sync::SpinLock;

const SIZE_CLASSES: [usize; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

struct HeapState {
    mapper: &'static dyn PhysMapper,
    frames: &'static SpinLock<PageAllocator>,
    classes: [SlabAllocator; SIZE_CLASSES.len()],
}

/// The kernel's global allocator. Returns null until [`init`](Self::init)
/// has run.
///
/// Lock order: heap, then page allocator. Code holding the page allocator
/// lock must not allocate.
pub struct KernelHeap {
    state: SpinLock<Option<HeapState>>,
}

impl Default for KernelHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelHeap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new(None),
        }
    }

    /// Attach the heap to the physical page allocator.
    pub fn init(&self, mapper: &'static dyn PhysMapper, frames: &'static SpinLock<PageAllocator>) {
        *self.state.lock_irq() = Some(HeapState {
            mapper,
            frames,
            classes: SIZE_CLASSES.map(SlabAllocator::new),
        });
    }

    /// Index into [`SIZE_CLASSES`], or `None` for page-backed layouts.
    fn class_of(layout: Layout) -> Option<usize> {
        let size = layout.size().max(layout.align());
        let class = SIZE_CLASSES.iter().position(|&c| c >= size)?;
        // Slots sit at header + n * class; alignment beyond this is not
        // guaranteed.
        let guaranteed = SIZE_CLASSES[class].min(SLAB_HEADER_SIZE);
        (layout.align() <= guaranteed).then_some(class)
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut guard = self.state.lock_irq();
        let Some(state) = guard.as_mut() else {
            return null_mut();
        };

        if let Some(class) = Self::class_of(layout) {
            let mut frames = state.frames.lock_irq();
            return state.classes[class]
                .alloc(state.mapper, &mut frames)
                .map_or(null_mut(), NonNull::as_ptr);
        }

        if layout.align() > PAGE_SIZE as usize {
            return null_mut();
        }
        let pages = pages_for(layout.size() as u64) as usize;
        let mut frames = state.frames.lock_irq();
        frames
            .try_alloc(pages)
            .map_or(null_mut(), |pa| state.mapper.phys_to_ptr(pa))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let mut guard = self.state.lock_irq();
        let (Some(state), Some(ptr)) = (guard.as_mut(), NonNull::new(ptr)) else {
            return;
        };

        if let Some(class) = Self::class_of(layout) {
            state.classes[class].free(ptr);
        } else {
            let pages = pages_for(layout.size() as u64) as usize;
            let pa = state.mapper.ptr_to_phys(ptr.as_ptr());
            state.frames.lock_irq().free(pa, pages);
        }
    }
}
