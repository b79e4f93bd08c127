use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// CR3 without PCIDs: the PML4 frame and its caching bits.
#[bitfield(u64)]
pub struct Cr3 {
    #[bits(3)]
    __: u8,
    pub pwt: bool,
    pub pcd: bool,
    #[bits(7)]
    __: u8,
    /// PML4 physical base >> 12.
    #[bits(40)]
    pml4_frame: u64,
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// CR3 pointing at the 4 KiB-aligned PML4 `root`, cached normally.
    #[must_use]
    pub const fn from_root(root: PhysicalAddress) -> Self {
        Self::new().with_pml4_frame(root.as_u64() >> 12)
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.pml4_frame() << 12)
    }
}

#[cfg(feature = "asm")]
impl crate::LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

/// Writing CR3 also flushes all non-global TLB entries.
#[cfg(feature = "asm")]
impl crate::StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) self.into_bits(), options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_drops_flag_bits() {
        let cr3 = Cr3::from_bits(0x0012_3000 | 0b1_1000);
        assert_eq!(cr3.root(), PhysicalAddress::new(0x0012_3000));
        assert!(cr3.pwt() && cr3.pcd());
        assert_eq!(Cr3::from_root(cr3.root()).into_bits(), 0x0012_3000);
    }
}
