//! Physical memory bring-up from the UEFI memory map.

use kernel_info::boot::{EFI_CONVENTIONAL_MEMORY, MemoryDescriptor, MemoryMapInfo};
use kernel_info::memory::HHDM_SIZE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};
use kernel_mm::{HhdmPhysMapper, PageAllocator, PhysMapper};
use kernel_sync::{SpinLock, SyncOnceCell};
use log::{debug, info};

pub static MAPPER: HhdmPhysMapper = HhdmPhysMapper;

static FRAMES: SyncOnceCell<SpinLock<PageAllocator>> = SyncOnceCell::new();

/// `(base, bytes)` of the largest conventional RAM region inside the HHDM.
fn largest_conventional_region(mmap: &MemoryMapInfo) -> Option<(PhysicalAddress, u64)> {
    let table = MAPPER.phys_to_ptr(PhysicalAddress::new(mmap.mmap_ptr));
    let count = mmap.mmap_len / mmap.mmap_desc_size;

    (0..count)
        .map(|i| unsafe {
            table
                .add((i * mmap.mmap_desc_size) as usize)
                .cast::<MemoryDescriptor>()
                .read_unaligned()
        })
        .filter(|d| d.ty == EFI_CONVENTIONAL_MEMORY)
        .inspect(|d| debug!("conventional: {:#x} +{} pages", d.phys_start, d.page_count))
        .map(|d| {
            let end = (d.phys_start + d.page_count * PAGE_SIZE).min(HHDM_SIZE);
            (d.phys_start, end.saturating_sub(d.phys_start))
        })
        .max_by_key(|&(_, bytes)| bytes)
        .map(|(base, bytes)| (PhysicalAddress::new(base), bytes))
}

/// Hand the largest free RAM region to the page allocator.
///
/// # Panics
/// When the memory map has no conventional memory.
pub fn init_frames(mmap: &MemoryMapInfo) -> &'static SpinLock<PageAllocator> {
    FRAMES.get_or_init(|| {
        let Some((base, bytes)) = largest_conventional_region(mmap) else {
            panic!("no conventional memory in the UEFI memory map");
        };
        info!("managing {} MiB of RAM at {base}", bytes / 1024 / 1024);
        SpinLock::new(unsafe { PageAllocator::new_in_region(&MAPPER, base, bytes) })
    })
}
