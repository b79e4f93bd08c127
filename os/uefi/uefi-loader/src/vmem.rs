//! # Kernel Page Tables
//!
//! The address space the kernel starts in:
//!
//! | Range | Maps to | Page size | Flags |
//! |-------|---------|-----------|-------|
//! | kernel segments at `KERNEL_BASE + PHYS_LOAD` | their load address | 2 MiB where aligned, else 4 KiB | from `p_flags` |
//! | `HHDM_BASE .. HHDM_BASE + HHDM_SIZE` | physical `0 ..` | 1 GiB | RW, NX |
//! | trampoline code page | itself | 4 KiB | RX |
//! | trampoline stack | itself | 4 KiB | RW, NX |
//!
//! The identity mappings only exist so the trampoline survives the `CR3`
//! switch. The kernel leaves them behind when it moves to its boot stack.

use crate::elf::loader::LoadedSegment;
use kernel_info::memory::{HHDM_BASE, HHDM_SIZE};
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, Size1G, Size2M, Size4K, VirtualAddress, pages_for,
};
use kernel_mm::paging::{MapError, PageEntryBits, map_page};
use kernel_mm::{FrameAlloc, PhysMapper};
use log::debug;
use uefi::boot::{self, AllocateType, MemoryType};

/// Page table frames straight from the firmware, as `LOADER_DATA` so the
/// kernel never reuses them.
struct BootServicesFrames;

impl FrameAlloc for BootServicesFrames {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
        let page = boot::allocate_pages(AllocateType::AnyPages, MemoryType::LOADER_DATA, 1).ok()?;
        Some(PhysicalAddress::new(page.as_ptr() as u64))
    }
}

/// Firmware memory is identity mapped while boot services run.
struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        pa.as_u64() as *mut u8
    }

    fn ptr_to_phys(&self, ptr: *const u8) -> PhysicalAddress {
        PhysicalAddress::new(ptr as u64)
    }
}

const TABLE: PageEntryBits = PageEntryBits::new().with_present(true).with_writable(true);

const KERNEL_LEAF: PageEntryBits = PageEntryBits::new().with_present(true).with_global(true);

#[derive(Debug, thiserror::Error)]
pub enum KernelPageTableError {
    #[error("no frame for the PML4")]
    OutOfMemory,
    #[error("mapping {0} failed")]
    Map(VirtualAddress, #[source] MapError),
}

/// Identity range the trampoline needs after the `CR3` switch.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRange {
    pub start: PhysicalAddress,
    pub len: u64,
    pub executable: bool,
}

/// Build the kernel's initial PML4 and return its physical address.
///
/// # Errors
/// When the firmware runs out of pages, or two mappings collide.
pub fn create_kernel_pagetables(
    segments: &[LoadedSegment],
    identity: &[IdentityRange],
) -> Result<PhysicalAddress, KernelPageTableError> {
    let mapper = IdentityMapper;
    let mut frames = BootServicesFrames;

    let root = frames.alloc_4k().ok_or(KernelPageTableError::OutOfMemory)?;
    mapper.zero_page(root);

    let mut map = |va: VirtualAddress, pa: PhysicalAddress, size: u64, leaf: PageEntryBits| {
        let result = if size == Size1G::SIZE {
            map_page::<Size1G>(&mapper, &mut frames, root, va, pa, TABLE, leaf)
        } else if size == Size2M::SIZE {
            map_page::<Size2M>(&mapper, &mut frames, root, va, pa, TABLE, leaf)
        } else {
            map_page::<Size4K>(&mapper, &mut frames, root, va, pa, TABLE, leaf)
        };
        result.map_err(|e| KernelPageTableError::Map(va, e))
    };

    for seg in segments {
        let leaf = KERNEL_LEAF
            .with_writable(seg.flags.write())
            .with_no_execute(!seg.flags.execute());
        debug!("kernel segment {} -> {} ({} bytes)", seg.va, seg.pa, seg.len);

        let mut offset = 0;
        while offset < seg.len {
            let va = seg.va + offset;
            let pa = seg.pa + offset;
            let size = if va.is_aligned::<Size2M>()
                && pa.is_aligned::<Size2M>()
                && seg.len - offset >= Size2M::SIZE
            {
                Size2M::SIZE
            } else {
                Size4K::SIZE
            };
            map(va, pa, size, leaf)?;
            offset += size;
        }
    }

    let hhdm_leaf = KERNEL_LEAF.with_writable(true).with_no_execute(true);
    for gib in 0..HHDM_SIZE / Size1G::SIZE {
        let offset = gib * Size1G::SIZE;
        map(
            VirtualAddress::new(HHDM_BASE + offset),
            PhysicalAddress::new(offset),
            Size1G::SIZE,
            hhdm_leaf,
        )?;
    }

    for range in identity {
        let leaf = PageEntryBits::new()
            .with_present(true)
            .with_writable(!range.executable)
            .with_no_execute(!range.executable);
        let first = range.start.align_down::<Size4K>();
        let pages = pages_for(range.start.as_u64() + range.len - first.as_u64());
        for page in 0..pages {
            let pa = first + page * Size4K::SIZE;
            map(VirtualAddress::new(pa.as_u64()), pa, Size4K::SIZE, leaf)?;
        }
    }

    Ok(root)
}
