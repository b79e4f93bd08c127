//! # UEFI Memory Map Utilities

use crate::memory::allocate_loader_pages;
use kernel_info::boot::MemoryMapInfo;
use log::{info, warn};
use uefi::boot::{self, MemoryType};
use uefi::mem::memory_map::MemoryMap;
use uefi::{Status, boot::PAGE_SIZE};

/// Descriptors the map may grow by between sizing the copy buffer and
/// `ExitBootServices`. Allocating the buffer itself already adds some.
const EXTRA_DESCS: usize = 32;

/// Exit boot services and hand back a copy of the final memory map in
/// `LOADER_DATA` pages the kernel can read through its HHDM.
///
/// # Errors
/// If the map cannot be sized or the copy buffer turns out too small.
pub fn exit_boot_services() -> Result<MemoryMapInfo, Status> {
    let probe = boot::memory_map(MemoryType::LOADER_DATA).map_err(|e| {
        warn!("failed to get the memory map: {e:?}");
        e.status()
    })?;
    let capacity = probe.meta().map_size + EXTRA_DESCS * probe.meta().desc_size;
    drop(probe);

    let copy = allocate_loader_pages(capacity as u64).map_err(|e| e.status())?;
    let capacity = capacity.next_multiple_of(PAGE_SIZE);

    info!("exiting boot services");
    let owned_map = unsafe { boot::exit_boot_services(None) };

    // No allocations from here on.
    let src = owned_map.buffer();
    if src.len() > capacity {
        return Err(Status::BUFFER_TOO_SMALL);
    }
    unsafe {
        core::ptr::copy_nonoverlapping(src.as_ptr(), copy.as_u64() as *mut u8, src.len());
    }

    let mmap = MemoryMapInfo {
        mmap_ptr: copy.as_u64(),
        mmap_len: src.len() as u64,
        mmap_desc_size: owned_map.meta().desc_size as u64,
        mmap_desc_version: owned_map.meta().desc_version,
    };
    core::mem::forget(owned_map);
    Ok(mmap)
}
