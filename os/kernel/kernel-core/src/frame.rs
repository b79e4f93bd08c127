/// Register image of a trapped task.
///
/// The interrupt entry stubs push the general purpose registers below the
/// CPU's `iretq` frame, so the layout from the lowest address is
/// `r15` first and `ss` last. The frame always ends at the task's kernel
/// entry stack pointer.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    // pushed by the CPU
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Registers `Platform::switch` pushes and pops (`rbp`, `rbx`, `r12`-`r15`).
pub const CALLEE_SAVED_SLOTS: usize = 6;

impl TrapFrame {
    /// Bytes occupied on the kernel stack.
    pub const SIZE: u64 = size_of::<Self>() as u64;

    /// A frame that enters user mode at `rip` with stack `rsp`.
    #[must_use]
    pub fn user(rip: u64, rsp: u64) -> Self {
        use kernel_info::gdt::{USER_CS, USER_DS, USER_RFLAGS};
        Self {
            rip,
            cs: u64::from(USER_CS),
            rflags: USER_RFLAGS,
            rsp,
            ss: u64::from(USER_DS),
            ..Self::default()
        }
    }

    /// Syscall number and the three argument registers.
    #[must_use]
    pub const fn syscall_args(&self) -> (u64, u64, u64, u64) {
        (self.rax, self.rdi, self.rsi, self.rdx)
    }
}
