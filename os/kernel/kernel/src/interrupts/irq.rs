//! Hardware interrupts from the remapped PICs.
//!
//! | IRQ | Device | Action |
//! |-----|--------|--------|
//! | 0 | PIT | count a tick |
//! | 1 | PS/2 keyboard | feed the scancode to the active console |
//! | 7 | spurious | ignore, no EOI |
//! | 9, 10, 11 | PCI (NVMe) | complete pending commands |
//!
//! Any other line is a fatal error. Handlers never switch tasks.

use crate::interrupts::Idt;
use crate::pic::{self, IRQ_BASE, IRQ_COUNT};
use crate::ports::inb;
use crate::{kernel, pit};
use core::arch::naked_asm;
use log::trace;

const KEYBOARD_DATA: u16 = 0x60;
const SPURIOUS_IRQ: u8 = 7;

macro_rules! irq_stub {
    ($name:ident, $irq:literal) => {
        #[unsafe(naked)]
        extern "C" fn $name() {
            naked_asm!(
                "push {irq}",
                "jmp {common}",
                irq = const $irq,
                common = sym irq_common,
            );
        }
    };
}

irq_stub!(irq_0, 0);
irq_stub!(irq_1, 1);
irq_stub!(irq_2, 2);
irq_stub!(irq_3, 3);
irq_stub!(irq_4, 4);
irq_stub!(irq_5, 5);
irq_stub!(irq_6, 6);
irq_stub!(irq_7, 7);
irq_stub!(irq_8, 8);
irq_stub!(irq_9, 9);
irq_stub!(irq_10, 10);
irq_stub!(irq_11, 11);
irq_stub!(irq_12, 12);
irq_stub!(irq_13, 13);
irq_stub!(irq_14, 14);
irq_stub!(irq_15, 15);

const STUBS: [extern "C" fn(); IRQ_COUNT as usize] = [
    irq_0, irq_1, irq_2, irq_3, irq_4, irq_5, irq_6, irq_7, irq_8, irq_9, irq_10, irq_11,
    irq_12, irq_13, irq_14, irq_15,
];

/// The iret frame and the IRQ number leave the stack 8 bytes off after the
/// 15 registers; one padding word restores the call alignment.
#[unsafe(naked)]
extern "C" fn irq_common() {
    naked_asm!(
        "cld",
        "push rax", "push rbx", "push rcx", "push rdx", "push rsi", "push rdi", "push rbp",
        "push r8", "push r9", "push r10", "push r11", "push r12", "push r13", "push r14", "push r15",
        "mov rdi, [rsp + 15 * 8]",
        "sub rsp, 8",
        "call {dispatch}",
        "add rsp, 8",
        "pop r15", "pop r14", "pop r13", "pop r12", "pop r11", "pop r10", "pop r9", "pop r8",
        "pop rbp", "pop rdi", "pop rsi", "pop rdx", "pop rcx", "pop rbx", "pop rax",
        // IRQ number
        "add rsp, 8",
        "iretq",
        dispatch = sym irq_dispatch,
    );
}

#[allow(clippy::cast_possible_truncation)]
extern "C" fn irq_dispatch(irq: u64) {
    let irq = irq as u8;
    match irq {
        0 => pit::tick(),
        1 => {
            let code = unsafe { inb(KEYBOARD_DATA) };
            trace!("scancode {code:#04x}");
            if let Some(kernel) = kernel() {
                kernel.handle_scancode(code);
            }
        }
        SPURIOUS_IRQ => return,
        9..=11 => {
            if let Some(kernel) = kernel() {
                kernel.handle_nvme_interrupt(irq);
            }
        }
        _ => panic!("Unhandled IRQ {irq}"),
    }
    pic::end_of_interrupt(irq);
}

pub fn install(idt: &mut Idt) {
    for (irq, stub) in STUBS.into_iter().enumerate() {
        idt[usize::from(IRQ_BASE) + irq].set_handler(stub).present(true);
    }
}
