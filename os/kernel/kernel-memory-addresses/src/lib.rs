//! # Virtual and Physical Memory Address Types
//!
//! Zero-cost wrappers that keep physical and virtual addresses apart at
//! compile time. Page-table code, the page allocator and the drivers all
//! pass these types instead of bare `u64`s, so a frame number can only be
//! turned into something dereferenceable through an explicit mapper.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | RAM frame or MMIO register address. |
//! | [`VirtualAddress`] | Address translated by the current page tables. |
//! | [`PageSize`] | Marker for [`Size4K`], [`Size2M`] and [`Size1G`]. |
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xFFFF_8880_0000_1234);
//! assert_eq!(va.align_down::<Size4K>().as_u64(), 0xFFFF_8880_0000_1000);
//! assert_eq!(va.table_index(0), 273);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod virtual_address;

pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Bytes in the base page size.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// Number of 4 KiB pages needed to cover `bytes`.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_for_rounds_up() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(4096), 1);
        assert_eq!(pages_for(4097), 2);
    }

    #[test]
    fn alignment_helpers() {
        let pa = PhysicalAddress::new(0x20_1001);
        assert_eq!(pa.align_up::<Size4K>().as_u64(), 0x20_2000);
        assert_eq!(pa.align_down::<Size2M>().as_u64(), 0x20_0000);
        assert!(PhysicalAddress::new(0x40_0000).is_aligned::<Size2M>());
        assert_eq!(pa.frame_number(), 0x201);
    }

    #[test]
    fn table_indices_split_the_address() {
        let va = VirtualAddress::new(0x0000_7FFF_FFF0_0000);
        assert_eq!(va.table_index(0), 255);
        assert_eq!(va.table_index(1), 511);
        assert_eq!(va.table_index(2), 511);
        assert_eq!(va.table_index(3), 256);

        let top = VirtualAddress::new(0xFFFF_FFFF_8000_0000);
        assert_eq!(top.table_index(0), 511);
        assert_eq!(top.table_index(1), 510);
    }

    #[test]
    fn subtraction_yields_distance() {
        let a = VirtualAddress::new(0x5000);
        let b = VirtualAddress::new(0x3000);
        assert_eq!(a - b, 0x2000);
        assert_eq!(PhysicalAddress::new(0x9000) - PhysicalAddress::new(0x1000), 0x8000);
    }
}
