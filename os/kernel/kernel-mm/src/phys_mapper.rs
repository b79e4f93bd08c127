use crate::paging::PageTable;
use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};

/// Turns physical addresses into pointers the current code can dereference,
/// and back.
///
/// The kernel sees all of RAM through the HHDM; the UEFI loader runs
/// identity mapped; host tests use a heap buffer. Page table walkers, the
/// page allocator and the slab allocator only ever talk to this trait.
pub trait PhysMapper: Sync {
    /// Pointer through which `pa` is accessible.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// Inverse of [`phys_to_ptr`](Self::phys_to_ptr).
    fn ptr_to_phys(&self, ptr: *const u8) -> PhysicalAddress;

    /// Borrow the 4 KiB frame at `pa` as bytes.
    ///
    /// # Safety
    /// `pa` must be page-aligned, backed by memory and not aliased mutably
    /// for the lifetime `'a`.
    unsafe fn page_bytes<'a>(&self, pa: PhysicalAddress) -> &'a mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.phys_to_ptr(pa), PAGE_SIZE as usize) }
    }

    /// Borrow the frame at `pa` as a page table.
    ///
    /// # Safety
    /// Same as [`page_bytes`](Self::page_bytes); the frame must hold a page
    /// table (or be about to be initialized as one).
    unsafe fn page_table<'a>(&self, pa: PhysicalAddress) -> &'a mut PageTable {
        unsafe { &mut *self.phys_to_ptr(pa).cast::<PageTable>() }
    }

    /// Fill the frame at `pa` with zeros.
    fn zero_page(&self, pa: PhysicalAddress) {
        unsafe { core::ptr::write_bytes(self.phys_to_ptr(pa), 0, PAGE_SIZE as usize) };
    }

    /// Copy one whole frame.
    fn copy_page(&self, dst: PhysicalAddress, src: PhysicalAddress) {
        if dst == src {
            return;
        }
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.phys_to_ptr(src),
                self.phys_to_ptr(dst),
                PAGE_SIZE as usize,
            );
        }
    }
}

/// [`PhysMapper`] for the kernel's higher-half direct map: physical address
/// `pa` is visible at `HHDM_BASE + pa`.
///
/// The loader maps [`HHDM_SIZE`](kernel_info::memory::HHDM_SIZE) bytes of
/// physical memory; addresses beyond that fault.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        (HHDM_BASE + pa.as_u64()) as *mut u8
    }

    #[inline]
    fn ptr_to_phys(&self, ptr: *const u8) -> PhysicalAddress {
        PhysicalAddress::new(ptr as u64 - HHDM_BASE)
    }
}
