use bitfield_struct::bitfield;

/// CR0 in 64-bit mode.
#[bitfield(u64)]
pub struct Cr0 {
    /// Bit 0: protected mode.
    pub pe: bool,
    pub mp: bool,
    pub em: bool,
    pub ts: bool,
    pub et: bool,
    pub ne: bool,
    #[bits(10)]
    __: u16,
    /// Bit 16: supervisor writes honor read-only pages.
    pub wp: bool,
    __: bool,
    pub am: bool,
    #[bits(10)]
    __: u16,
    pub nw: bool,
    pub cd: bool,
    /// Bit 31: paging.
    pub pg: bool,
    #[bits(32)]
    __: u32,
}

#[cfg(feature = "asm")]
impl crate::LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let cr0: u64;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(feature = "asm")]
impl crate::StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) self.into_bits(), options(nostack, preserves_flags));
        }
    }
}
