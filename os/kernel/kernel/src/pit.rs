//! # 8253/8254 Programmable Interval Timer
//!
//! Channel 0 drives IRQ 0 at [`TICK_HZ`]; the interrupt handler counts
//! ticks, which is the kernel's only notion of time.

use crate::ports::outb;
use core::sync::atomic::{AtomicU64, Ordering};

/// Timer interrupts per second.
pub const TICK_HZ: u32 = 100;

const PIT_INPUT_HZ: u32 = 1_193_182;
const CHANNEL0_DATA: u16 = 0x40;
const MODE_COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave), binary.
const CHANNEL0_SQUARE_WAVE: u8 = 0b0011_0110;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program channel 0 for [`TICK_HZ`].
///
/// # Safety
/// Interrupts must be disabled.
#[allow(clippy::cast_possible_truncation)]
pub unsafe fn init() {
    let divisor = (PIT_INPUT_HZ / TICK_HZ) as u16;
    unsafe {
        outb(MODE_COMMAND, CHANNEL0_SQUARE_WAVE);
        outb(CHANNEL0_DATA, divisor as u8);
        outb(CHANNEL0_DATA, (divisor >> 8) as u8);
    }
}

/// Called from the IRQ 0 handler.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Ticks since [`init`].
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}
