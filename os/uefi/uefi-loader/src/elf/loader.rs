//! # ELF Segment Loader
//!
//! The kernel links at `KERNEL_BASE + PHYS_LOAD` with `AT(ADDR - KERNEL_BASE)`,
//! so every segment has a fixed physical home:
//! `phys = vaddr - KERNEL_BASE`. The loader claims exactly those pages from
//! the firmware and copies the file bytes there.

use crate::elf::parser::{ElfHeader, PFlags};
use alloc::vec::Vec;
use core::ptr;
use kernel_info::memory::{KERNEL_BASE, PHYS_LOAD};
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress, pages_for};
use uefi::Status;
use uefi::boot::{self, AllocateType, MemoryType};

#[derive(Debug, thiserror::Error)]
pub enum ElfLoaderError {
    #[error("segment at {0} lies below the kernel load address")]
    BelowLoadAddress(VirtualAddress),
    #[error("segment extends past the end of the file")]
    FileTooShort,
    #[error("segment size overflows the address space")]
    Overflow,
    #[error("the firmware refused the pages at {0}")]
    Allocation(PhysicalAddress, #[source] uefi::Error),
}

impl From<ElfLoaderError> for Status {
    fn from(value: ElfLoaderError) -> Self {
        match value {
            ElfLoaderError::Allocation(..) => Self::OUT_OF_RESOURCES,
            ElfLoaderError::BelowLoadAddress(_)
            | ElfLoaderError::FileTooShort
            | ElfLoaderError::Overflow => Self::LOAD_ERROR,
        }
    }
}

/// A loaded segment, page-rounded, ready to be mapped.
#[derive(Debug, Clone, Copy)]
pub struct LoadedSegment {
    pub va: VirtualAddress,
    pub pa: PhysicalAddress,
    pub len: u64,
    pub flags: PFlags,
}

/// Copy every `PT_LOAD` segment of `elf_bytes` to its physical load address
/// and zero the BSS tail.
///
/// # Errors
/// See [`ElfLoaderError`].
pub fn load_kernel_segments(
    elf_bytes: &[u8],
    hdr: &ElfHeader,
) -> Result<Vec<LoadedSegment>, ElfLoaderError> {
    let mut loaded = Vec::with_capacity(hdr.segments.len());

    for seg in hdr.segments.iter().filter(|s| s.memsz != 0) {
        let phys = seg
            .vaddr
            .as_u64()
            .checked_sub(KERNEL_BASE)
            .filter(|&pa| pa >= PHYS_LOAD)
            .ok_or(ElfLoaderError::BelowLoadAddress(seg.vaddr))?;
        let phys = PhysicalAddress::new(phys);

        let first = phys.align_down::<Size4K>();
        let end = phys
            .as_u64()
            .checked_add(seg.memsz)
            .ok_or(ElfLoaderError::Overflow)?;
        let pages = pages_for(end - first.as_u64()) as usize;

        let mem_type = if seg.flags.execute() {
            MemoryType::LOADER_CODE
        } else {
            MemoryType::LOADER_DATA
        };
        boot::allocate_pages(AllocateType::Address(first.as_u64()), mem_type, pages)
            .map_err(|e| ElfLoaderError::Allocation(first, e))?;

        let file = usize::try_from(seg.offset)
            .ok()
            .zip(usize::try_from(seg.filesz).ok())
            .and_then(|(off, len)| elf_bytes.get(off..off.checked_add(len)?))
            .ok_or(ElfLoaderError::FileTooShort)?;

        // Identity mapped while boot services run.
        let dst = phys.as_u64() as *mut u8;
        unsafe {
            ptr::write_bytes(dst, 0, seg.memsz as usize);
            ptr::copy_nonoverlapping(file.as_ptr(), dst, file.len());
        }

        loaded.push(LoadedSegment {
            va: seg.vaddr.align_down::<Size4K>(),
            pa: first,
            len: pages as u64 * Size4K::SIZE,
            flags: seg.flags,
        });
    }

    Ok(loaded)
}
