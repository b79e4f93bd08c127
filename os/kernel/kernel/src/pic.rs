//! # 8259 Programmable Interrupt Controller
//!
//! The two cascaded PICs are remapped so that IRQ 0..15 arrive on vectors
//! [`IRQ_BASE`]`..IRQ_BASE + 16`, clear of the CPU exception range.

use crate::ports::{inb, io_wait, outb};

/// Vector of IRQ 0.
pub const IRQ_BASE: u8 = 32;

/// Number of IRQ lines across both controllers.
pub const IRQ_COUNT: u8 = 16;

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// Lines left unmasked: timer, keyboard and the cascade on the master,
/// IRQ 9..11 (PCI) on the slave.
const MASTER_MASK: u8 = !0b0000_0111;
const SLAVE_MASK: u8 = !0b0000_1110;

/// Reinitialize both controllers with the vector offsets and masks above.
///
/// # Safety
/// Interrupts must be disabled.
pub unsafe fn remap() {
    unsafe {
        outb(MASTER_COMMAND, ICW1_INIT | ICW1_ICW4);
        io_wait();
        outb(SLAVE_COMMAND, ICW1_INIT | ICW1_ICW4);
        io_wait();
        outb(MASTER_DATA, IRQ_BASE);
        io_wait();
        outb(SLAVE_DATA, IRQ_BASE + 8);
        io_wait();
        // slave on IRQ 2
        outb(MASTER_DATA, 1 << 2);
        io_wait();
        outb(SLAVE_DATA, 2);
        io_wait();
        outb(MASTER_DATA, ICW4_8086);
        io_wait();
        outb(SLAVE_DATA, ICW4_8086);
        io_wait();

        outb(MASTER_DATA, MASTER_MASK);
        outb(SLAVE_DATA, SLAVE_MASK);
    }
}

/// Acknowledge `irq`. Lines routed through the slave need both controllers
/// acknowledged.
pub fn end_of_interrupt(irq: u8) {
    unsafe {
        if irq >= 8 {
            outb(SLAVE_COMMAND, EOI);
        }
        outb(MASTER_COMMAND, EOI);
    }
}

/// Current masks of `(master, slave)`.
pub fn masks() -> (u8, u8) {
    unsafe { (inb(MASTER_DATA), inb(SLAVE_DATA)) }
}
