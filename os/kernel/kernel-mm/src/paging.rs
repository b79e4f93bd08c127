//! # x86-64 Paging
//!
//! Four-level page tables rooted at a PML4 frame:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! Intermediate tables are allocated and zeroed on demand while walking down
//! to the leaf level of the requested [`PageSize`]. Every table lives in a
//! physical frame reached through a [`PhysMapper`].
//!
//! Each task owns one PML4. Its upper half (entries 256..512) is copied from
//! the kernel's PML4 so the kernel stays mapped in every address space; the
//! lower half belongs to the task and is torn down with [`free_userspace`].

mod entry;

pub use entry::PageEntryBits;

use crate::{FrameAlloc, PageAllocator, PhysMapper};
use kernel_info::memory::USER_PML4_ENTRIES;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress};

/// Number of entries in each table level.
pub const ENTRIES: usize = 512;

/// One 4 KiB page table at any level.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; ENTRIES],
}

impl PageTable {
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntryBits::new());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> PageEntryBits {
        self.entries[index]
    }

    #[inline]
    pub const fn set(&mut self, index: usize, entry: PageEntryBits) {
        self.entries[index] = entry;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("Out of physical memory")]
    OutOfMemory,
    #[error("phys_address must be page-aligned")]
    Unaligned,
    #[error("a large page already covers {0:?}")]
    LargePageInPath(VirtualAddress),
}

/// Flags for intermediate (non-leaf) entries: present, writable, user,
/// accessed. Leaf flags decide the effective permissions.
pub const TABLE_FLAGS: PageEntryBits = PageEntryBits::new()
    .with_present(true)
    .with_writable(true)
    .with_user_access(true)
    .with_accessed(true);

/// Leaf flags for ordinary RAM mappings.
pub const PAGE_FLAGS: PageEntryBits = TABLE_FLAGS.with_dirty(true);

/// Leaf flags for device memory: uncached, write-through.
pub const MMIO_FLAGS: PageEntryBits = PAGE_FLAGS.with_write_through(true).with_cache_disabled(true);

/// Map one page of size `S` at `va` to `pa` in the address space rooted at
/// `root`.
///
/// Missing intermediate tables are allocated from `frames`, zeroed and linked
/// with `table_flags`. An existing leaf is overwritten. The caller flushes
/// the TLB if `root` is active.
///
/// # Errors
/// * [`MapError::Unaligned`] if `pa` or `va` is not aligned to `S`.
/// * [`MapError::OutOfMemory`] if a table frame cannot be allocated.
/// * [`MapError::LargePageInPath`] if a larger leaf already covers `va`.
pub fn map_page<S: PageSize>(
    mapper: &dyn PhysMapper,
    frames: &mut dyn FrameAlloc,
    root: PhysicalAddress,
    va: VirtualAddress,
    pa: PhysicalAddress,
    table_flags: PageEntryBits,
    leaf_flags: PageEntryBits,
) -> Result<(), MapError> {
    if !pa.is_aligned::<S>() || !va.is_aligned::<S>() {
        return Err(MapError::Unaligned);
    }

    let mut table = root;
    for depth in 0..S::LEAF_DEPTH {
        let tbl = unsafe { mapper.page_table(table) };
        let index = va.table_index(depth);
        let entry = tbl.get(index);
        table = if !entry.present() {
            let next = frames.alloc_4k().ok_or(MapError::OutOfMemory)?;
            mapper.zero_page(next);
            tbl.set(index, table_flags.with_physical_address(next));
            next
        } else if entry.large_page() {
            return Err(MapError::LargePageInPath(va));
        } else {
            entry.physical_address()
        };
    }

    let leaf = leaf_flags
        .with_large_page(S::LEAF_DEPTH < 3)
        .with_physical_address(pa);
    let tbl = unsafe { mapper.page_table(table) };
    tbl.set(va.table_index(S::LEAF_DEPTH), leaf);
    Ok(())
}

/// Install a single 4 KiB mapping with the fixed user attributes, or the
/// uncached device attributes when `is_mmio` is set.
///
/// # Panics
/// If `pa` is not page-aligned or page table frames run out; both are
/// unrecoverable.
pub fn set_page_mapping(
    mapper: &dyn PhysMapper,
    frames: &mut PageAllocator,
    root: PhysicalAddress,
    va: VirtualAddress,
    pa: PhysicalAddress,
    is_mmio: bool,
) {
    let leaf = if is_mmio { MMIO_FLAGS } else { PAGE_FLAGS };
    let va = va.align_down::<Size4K>();
    if let Err(e) = map_page::<Size4K>(mapper, frames, root, va, pa, TABLE_FLAGS, leaf) {
        panic!("{e}");
    }
}

/// Translate `va` in the address space rooted at `root`.
///
/// Large pages are resolved with their in-page offset.
#[must_use]
pub fn translate(
    mapper: &dyn PhysMapper,
    root: PhysicalAddress,
    va: VirtualAddress,
) -> Option<PhysicalAddress> {
    let mut table = root;
    for depth in 0..4 {
        let entry = unsafe { mapper.page_table(table) }.get(va.table_index(depth));
        if !entry.present() {
            return None;
        }
        if depth == 3 || entry.large_page() {
            let span_mask = (1u64 << (39 - 9 * depth as u64)) - 1;
            return Some(entry.physical_address() + (va.as_u64() & span_mask));
        }
        table = entry.physical_address();
    }
    None
}

/// Allocate a fresh PML4 whose upper half mirrors `kernel_root` and whose
/// user half is empty.
///
/// # Errors
/// [`MapError::OutOfMemory`] if no frame is available.
pub fn new_address_space(
    mapper: &dyn PhysMapper,
    frames: &mut dyn FrameAlloc,
    kernel_root: PhysicalAddress,
) -> Result<PhysicalAddress, MapError> {
    let root = frames.alloc_4k().ok_or(MapError::OutOfMemory)?;
    mapper.zero_page(root);
    let kernel = unsafe { mapper.page_table(kernel_root) };
    let table = unsafe { mapper.page_table(root) };
    for i in USER_PML4_ENTRIES..ENTRIES {
        table.set(i, kernel.get(i));
    }
    Ok(root)
}

/// Free every user page and every user page table below `root`, clearing the
/// entries on the way. The PML4 frame itself stays allocated so it can be
/// reused for the next program image.
pub fn free_userspace(mapper: &dyn PhysMapper, frames: &mut PageAllocator, root: PhysicalAddress) {
    let pml4 = unsafe { mapper.page_table(root) };
    for i in 0..USER_PML4_ENTRIES {
        let entry = pml4.get(i);
        if entry.present() {
            free_table(mapper, frames, entry.physical_address(), 1);
            pml4.set(i, PageEntryBits::new());
        }
    }
}

fn free_table(
    mapper: &dyn PhysMapper,
    frames: &mut PageAllocator,
    table: PhysicalAddress,
    depth: usize,
) {
    let tbl = unsafe { mapper.page_table(table) };
    for i in 0..ENTRIES {
        let entry = tbl.get(i);
        if !entry.present() {
            continue;
        }
        if depth == 3 {
            frames.free(entry.physical_address(), 1);
        } else if !entry.large_page() {
            free_table(mapper, frames, entry.physical_address(), depth + 1);
        }
        tbl.set(i, PageEntryBits::new());
    }
    frames.free(table, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::TestPhysMemory;
    use kernel_memory_addresses::{PAGE_SIZE, Size2M};

    struct Fixture {
        mem: &'static TestPhysMemory,
        frames: PageAllocator,
        root: PhysicalAddress,
    }

    fn fixture() -> Fixture {
        let mem = TestPhysMemory::leak(64);
        let mut frames = unsafe { PageAllocator::new_in_region(mem, mem.phys_base(), mem.len()) };
        let root = frames.alloc(1);
        mem.zero_page(root);
        Fixture { mem, frames, root }
    }

    #[test]
    fn mapping_builds_three_tables_and_translates() {
        let mut f = fixture();
        let data = f.frames.alloc(1);
        let used_before = f.frames.used_pages();

        let va = VirtualAddress::new(0x40_0000);
        set_page_mapping(f.mem, &mut f.frames, f.root, va, data, false);

        assert_eq!(f.frames.used_pages(), used_before + 3);
        assert_eq!(translate(f.mem, f.root, va + 0x123), Some(data + 0x123));
        assert_eq!(translate(f.mem, f.root, va + PAGE_SIZE), None);

        let pml4 = unsafe { f.mem.page_table(f.root) };
        assert_eq!(pml4.get(0).into_bits() & 0xFFF, 0x27);
    }

    #[test]
    fn second_mapping_in_same_table_allocates_nothing() {
        let mut f = fixture();
        let a = f.frames.alloc(1);
        let b = f.frames.alloc(1);
        set_page_mapping(f.mem, &mut f.frames, f.root, VirtualAddress::new(0x1000), a, false);
        let used = f.frames.used_pages();
        set_page_mapping(f.mem, &mut f.frames, f.root, VirtualAddress::new(0x2000), b, false);
        assert_eq!(f.frames.used_pages(), used);
    }

    #[test]
    fn mmio_leaves_are_uncached() {
        let mut f = fixture();
        let bar = PhysicalAddress::new(0xFEB0_0000);
        let va = VirtualAddress::new(0x7000_0000);
        set_page_mapping(f.mem, &mut f.frames, f.root, va, bar, true);
        assert_eq!(translate(f.mem, f.root, va), Some(bar));
        assert_eq!(MMIO_FLAGS.into_bits(), 0x7F);
        assert_eq!(PAGE_FLAGS.into_bits(), 0x67);
    }

    #[test]
    #[should_panic(expected = "phys_address must be page-aligned")]
    fn unaligned_physical_address_is_fatal() {
        let mut f = fixture();
        let pa = f.frames.alloc(1) + 8;
        set_page_mapping(f.mem, &mut f.frames, f.root, VirtualAddress::new(0x1000), pa, false);
    }

    #[test]
    fn large_pages_translate_with_offset() {
        let mut f = fixture();
        let va = VirtualAddress::new(0x20_0000);
        let pa = PhysicalAddress::new(0x4000_0000);
        map_page::<Size2M>(f.mem, &mut f.frames, f.root, va, pa, TABLE_FLAGS, PAGE_FLAGS).unwrap();
        assert_eq!(translate(f.mem, f.root, va + 0x1_2345), Some(pa + 0x1_2345));

        let err = map_page::<Size4K>(
            f.mem,
            &mut f.frames,
            f.root,
            va + PAGE_SIZE,
            PhysicalAddress::new(0x1000),
            TABLE_FLAGS,
            PAGE_FLAGS,
        );
        assert_eq!(err, Err(MapError::LargePageInPath(va + PAGE_SIZE)));
    }

    #[test]
    fn new_address_space_shares_the_kernel_half() {
        let mut f = fixture();
        let kernel_page = f.frames.alloc(1);
        let kva = VirtualAddress::new(0xFFFF_8000_0000_0000);
        set_page_mapping(f.mem, &mut f.frames, f.root, kva, kernel_page, false);

        let user = new_address_space(f.mem, &mut f.frames, f.root).unwrap();
        assert_eq!(translate(f.mem, user, kva), Some(kernel_page));
        let table = unsafe { f.mem.page_table(user) };
        assert!((0..USER_PML4_ENTRIES).all(|i| !table.get(i).present()));
    }

    #[test]
    fn free_userspace_returns_all_user_frames() {
        let mut f = fixture();
        let kernel_page = f.frames.alloc(1);
        let kva = VirtualAddress::new(0xFFFF_8000_0000_0000);
        set_page_mapping(f.mem, &mut f.frames, f.root, kva, kernel_page, false);
        let user = new_address_space(f.mem, &mut f.frames, f.root).unwrap();
        let baseline = f.frames.used_pages();

        for (i, va) in [0x40_0000u64, 0x40_1000, 0x7fff_fff0_0000].into_iter().enumerate() {
            let page = f.frames.alloc(1);
            unsafe { f.mem.page_bytes(page) }.fill(i as u8);
            set_page_mapping(f.mem, &mut f.frames, user, VirtualAddress::new(va), page, false);
        }
        assert!(f.frames.used_pages() > baseline);

        free_userspace(f.mem, &mut f.frames, user);
        assert_eq!(f.frames.used_pages(), baseline);
        assert_eq!(translate(f.mem, user, VirtualAddress::new(0x40_0000)), None);
        // the kernel half is untouched
        assert_eq!(translate(f.mem, user, kva), Some(kernel_page));
    }
}
