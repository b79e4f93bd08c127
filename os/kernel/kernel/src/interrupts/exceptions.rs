//! CPU exception entry.
//!
//! Each vector has a stub that normalizes the stack (a zero error code for
//! vectors where the CPU pushes none, then the vector number) and jumps to
//! a common path that saves the registers and calls [`exception_dispatch`].
//! Exceptions never return: the kernel either terminates the faulting task
//! or panics.

use crate::interrupts::Idt;
use crate::tss::DOUBLE_FAULT_IST;
use crate::{halt_forever, kernel};
use core::arch::naked_asm;
use kernel_core::{Exception, TrapFrame};
use log::error;

/// Stack image built by the stubs and the common path.
#[repr(C)]
struct ExceptionFrame {
    /// `r15` .. `rax`, in [`TrapFrame`] order.
    gprs: [u64; 15],
    vector: u64,
    error_code: u64,
    rip: u64,
    cs: u64,
    rflags: u64,
    rsp: u64,
    ss: u64,
}

impl ExceptionFrame {
    fn trap_frame(&self) -> TrapFrame {
        let [r15, r14, r13, r12, r11, r10, r9, r8, rbp, rdi, rsi, rdx, rcx, rbx, rax] = self.gprs;
        TrapFrame {
            r15,
            r14,
            r13,
            r12,
            r11,
            r10,
            r9,
            r8,
            rbp,
            rdi,
            rsi,
            rdx,
            rcx,
            rbx,
            rax,
            rip: self.rip,
            cs: self.cs,
            rflags: self.rflags,
            rsp: self.rsp,
            ss: self.ss,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn exception(&self) -> Exception {
        match self.vector {
            0 => Exception::DivideError,
            8 => Exception::DoubleFault,
            13 => Exception::GeneralProtection,
            14 => Exception::PageFault {
                address: read_cr2(),
                error_code: self.error_code,
            },
            vector => Exception::Other(vector as u8),
        }
    }
}

fn read_cr2() -> u64 {
    let cr2: u64;
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    cr2
}

macro_rules! exception_stub {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            naked_asm!(
                "push 0",
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym exception_common,
            );
        }
    };
    ($name:ident, $vector:literal, error_code) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            naked_asm!(
                "push {vector}",
                "jmp {common}",
                vector = const $vector,
                common = sym exception_common,
            );
        }
    };
}

exception_stub!(vector_0, 0);
exception_stub!(vector_1, 1);
exception_stub!(vector_2, 2);
exception_stub!(vector_3, 3);
exception_stub!(vector_4, 4);
exception_stub!(vector_5, 5);
exception_stub!(vector_6, 6);
exception_stub!(vector_7, 7);
exception_stub!(vector_8, 8, error_code);
exception_stub!(vector_9, 9);
exception_stub!(vector_10, 10, error_code);
exception_stub!(vector_11, 11, error_code);
exception_stub!(vector_12, 12, error_code);
exception_stub!(vector_13, 13, error_code);
exception_stub!(vector_14, 14, error_code);
exception_stub!(vector_15, 15);
exception_stub!(vector_16, 16);
exception_stub!(vector_17, 17, error_code);
exception_stub!(vector_18, 18);
exception_stub!(vector_19, 19);
exception_stub!(vector_20, 20);
exception_stub!(vector_21, 21, error_code);
exception_stub!(vector_22, 22);
exception_stub!(vector_23, 23);
exception_stub!(vector_24, 24);
exception_stub!(vector_25, 25);
exception_stub!(vector_26, 26);
exception_stub!(vector_27, 27);
exception_stub!(vector_28, 28);
exception_stub!(vector_29, 29, error_code);
exception_stub!(vector_30, 30, error_code);
exception_stub!(vector_31, 31);

const STUBS: [extern "C" fn(); 32] = [
    vector_0, vector_1, vector_2, vector_3, vector_4, vector_5, vector_6, vector_7, vector_8,
    vector_9, vector_10, vector_11, vector_12, vector_13, vector_14, vector_15, vector_16,
    vector_17, vector_18, vector_19, vector_20, vector_21, vector_22, vector_23, vector_24,
    vector_25, vector_26, vector_27, vector_28, vector_29, vector_30, vector_31,
];

/// Seven words were pushed (iret frame, error code, vector), the 15
/// registers make the stack 16-byte aligned for the call.
#[unsafe(naked)]
extern "C" fn exception_common() {
    naked_asm!(
        "cld",
        "push rax", "push rbx", "push rcx", "push rdx", "push rsi", "push rdi", "push rbp",
        "push r8", "push r9", "push r10", "push r11", "push r12", "push r13", "push r14", "push r15",
        "mov rdi, rsp",
        "call {dispatch}",
        "ud2",
        dispatch = sym exception_dispatch,
    );
}

extern "C" fn exception_dispatch(frame: &ExceptionFrame) -> ! {
    let exception = frame.exception();
    let Some(kernel) = kernel() else {
        error!(
            "{exception:?} before the kernel was up: rip={:#x} error={:#x}",
            frame.rip, frame.error_code
        );
        halt_forever();
    };

    kernel.handle_exception(exception, &frame.trap_frame());
    // A terminated task is never scheduled again.
    error!("faulting task resumed after {exception:?}");
    halt_forever();
}

pub fn install(idt: &mut Idt) {
    for (vector, stub) in STUBS.into_iter().enumerate() {
        let gate = idt[vector].set_handler(stub).present(true);
        if vector == 8 {
            gate.ist(DOUBLE_FAULT_IST);
        }
    }
}
