//! Stack switching between tasks.
//!
//! A suspended task is a kernel stack pointer. Below it sit the six
//! callee-saved registers and a return address: into the middle of
//! whatever called [`switch_stacks`] for a task that yielded, or into a
//! trampoline for a task that never ran.

use core::arch::naked_asm;

/// Push the callee-saved registers, store `rsp` to `*save`, continue on
/// `load` and pop the callee-saved registers found there.
///
/// # Safety
/// `load` must point at a stack image with six register slots and a
/// return address.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_stacks(save: *mut u64, load: u64) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}

/// First return address of a kernel task: the slot above holds the entry
/// point. Entries must not return.
#[unsafe(naked)]
pub extern "C" fn kernel_task_trampoline() {
    naked_asm!("pop rax", "sti", "and rsp, -16", "call rax", "ud2");
}
