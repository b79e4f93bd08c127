//! `int 0x80` entry and the return path to user mode.
//!
//! The gate is reachable from ring 3. The entry stub pushes the registers
//! below the CPU's iret frame, which turns the top of the task's kernel
//! stack into a [`TrapFrame`]; the kernel reads the arguments from it and
//! writes the result into its `rax`.

use crate::interrupts::Idt;
use crate::kernel;
use core::arch::naked_asm;
use kernel_core::TrapFrame;
use log::error;

pub const SYSCALL_VECTOR: usize = 0x80;

/// 5 iret words plus 15 registers: the call is 16-byte aligned.
#[unsafe(naked)]
pub extern "C" fn int80_entry() {
    naked_asm!(
        "cld",
        "push rax", "push rbx", "push rcx", "push rdx", "push rsi", "push rdi", "push rbp",
        "push r8", "push r9", "push r10", "push r11", "push r12", "push r13", "push r14", "push r15",
        "mov rdi, rsp",
        "call {dispatch}",
        "jmp {ret}",
        dispatch = sym syscall_dispatch,
        ret = sym user_return,
    );
}

/// Pop a [`TrapFrame`] and `iretq` into it.
///
/// Also the first return address of every new or forked user task, so it
/// must be entered with the stack pointing at the frame.
#[unsafe(naked)]
pub extern "C" fn user_return() {
    naked_asm!(
        "pop r15", "pop r14", "pop r13", "pop r12", "pop r11", "pop r10", "pop r9", "pop r8",
        "pop rbp", "pop rdi", "pop rsi", "pop rdx", "pop rcx", "pop rbx", "pop rax",
        "iretq",
    );
}

extern "C" fn syscall_dispatch(frame: &mut TrapFrame) {
    match kernel() {
        Some(kernel) => kernel.syscall(frame),
        None => error!("int 0x80 before the kernel was up"),
    }
}

pub fn install(idt: &mut Idt) {
    idt[SYSCALL_VECTOR].set_handler(int80_entry).dpl(3).present(true);
}
