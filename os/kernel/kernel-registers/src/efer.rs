use bitfield_struct::bitfield;

/// `IA32_EFER` (MSR `0xC000_0080`).
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct Efer {
    /// `SYSCALL`/`SYSRET` enable. The kernel enters through `int 0x80`
    /// and leaves this alone.
    pub sce: bool,
    #[bits(7)]
    __: u8,
    /// Long mode enable.
    pub lme: bool,
    __: bool,
    /// Long mode active, read-only.
    pub lma: bool,
    /// No-execute enable; without it the NX page bit is reserved and
    /// faults.
    pub nxe: bool,
    #[bits(52)]
    __: u64,
}

impl Efer {
    pub const MSR: u32 = 0xC000_0080;
}

#[cfg(feature = "asm")]
impl crate::LoadRegisterUnsafe for Efer {
    unsafe fn load_unsafe() -> Self {
        let (lo, hi): (u32, u32);
        unsafe {
            core::arch::asm!(
                "rdmsr",
                in("ecx") Self::MSR,
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits((u64::from(hi) << 32) | u64::from(lo))
    }
}

#[cfg(feature = "asm")]
impl crate::StoreRegisterUnsafe for Efer {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        let bits = self.into_bits();
        unsafe {
            core::arch::asm!(
                "wrmsr",
                in("ecx") Self::MSR,
                in("eax") bits as u32,
                in("edx") (bits >> 32) as u32,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_mode_bits() {
        let efer = Efer::from_bits(0xD01);
        assert!(efer.sce() && efer.lme() && efer.lma());
        assert!(efer.nxe());
        assert_eq!(Efer::new().with_nxe(true).into_bits(), 1 << 11);
    }
}
