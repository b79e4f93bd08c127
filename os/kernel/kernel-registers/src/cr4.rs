use bitfield_struct::bitfield;

/// CR4, architecturally defined bits only.
#[bitfield(u64)]
pub struct Cr4 {
    pub vme: bool,
    pub pvi: bool,
    pub tsd: bool,
    pub de: bool,
    pub pse: bool,
    /// Bit 5: required in long mode.
    pub pae: bool,
    pub mce: bool,
    /// Bit 7: global pages survive CR3 reloads.
    pub pge: bool,
    pub pce: bool,
    pub osfxsr: bool,
    pub osxmmexcpt: bool,
    pub umip: bool,
    pub la57: bool,
    pub vmxe: bool,
    pub smxe: bool,
    __: bool,
    pub fsgsbase: bool,
    pub pcide: bool,
    pub osxsave: bool,
    __: bool,
    pub smep: bool,
    pub smap: bool,
    pub pke: bool,
    #[bits(41)]
    __: u64,
}

#[cfg(feature = "asm")]
impl crate::LoadRegisterUnsafe for Cr4 {
    unsafe fn load_unsafe() -> Self {
        let cr4: u64;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr4)
    }
}

#[cfg(feature = "asm")]
impl crate::StoreRegisterUnsafe for Cr4 {
    unsafe fn store_unsafe(self) {
        unsafe {
            core::arch::asm!("mov cr4, {}", in(reg) self.into_bits(), options(nostack, preserves_flags));
        }
    }
}
