use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A single 64-bit page table entry, valid at every level.
///
/// | Bits  | Field             | Meaning |
/// |-------|-------------------|---------|
/// | 0     | `present`         | Entry is valid |
/// | 1     | `writable`        | Writes allowed |
/// | 2     | `user_access`     | Ring 3 may access |
/// | 3     | `write_through`   | PWT |
/// | 4     | `cache_disabled`  | PCD |
/// | 5     | `accessed`        | Set by the CPU on access |
/// | 6     | `dirty`           | Set by the CPU on write (leaf only) |
/// | 7     | `large_page`      | PS: 1 GiB / 2 MiB leaf in PDPT / PD |
/// | 8     | `global`          | Survives CR3 reloads (leaf only) |
/// | 12–51 | address           | Physical frame bits \[51:12\] |
/// | 63    | `no_execute`      | NX, requires `EFER.NXE` |
///
/// ```rust
/// # use kernel_memory_addresses::PhysicalAddress;
/// # use kernel_mm::paging::PageEntryBits;
/// let e = PageEntryBits::new()
///     .with_present(true)
///     .with_writable(true)
///     .with_physical_address(PhysicalAddress::new(0x12_3000));
/// assert!(e.present());
/// assert_eq!(e.physical_address().as_u64(), 0x12_3000);
/// assert_eq!(e.into_bits(), 0x12_3003);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    pub present: bool,
    pub writable: bool,
    pub user_access: bool,
    pub write_through: bool,
    pub cache_disabled: bool,
    pub accessed: bool,
    /// Leaf only.
    pub dirty: bool,
    /// In a 4 KiB PTE this bit position is PAT; the kernel never sets it there.
    pub large_page: bool,
    pub global: bool,
    #[bits(3)]
    pub os_available_low: u8,
    #[bits(40)]
    phys_addr_bits_51_12: u64,
    #[bits(11)]
    pub os_available_high: u16,
    pub no_execute: bool,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn with_physical_address(self, phys: PhysicalAddress) -> Self {
        self.with_phys_addr_bits_51_12(phys.as_u64() >> 12)
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_bits_51_12() << 12)
    }
}
