//! # QEMU Debug Console Support
//!
//! Output to QEMU's debug console (`-debugcon`), which captures every byte
//! written to I/O port `0x402`. The kernel uses it for two things:
//!
//! * [`QemuLogger`], the `log` backend installed first thing at boot, and
//! * mirroring of TTY output via [`qemu_fmt::dbg_write_bytes`], so console
//!   text is visible on the host without a framebuffer.
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! QemuLogger::new(LevelFilter::Debug).init().ok();
//! info!("memory manager ready");
//! ```
//!
//! Host side:
//!
//! ```bash
//! qemu-system-x86_64 ... -debugcon stdio
//! ```
//!
//! With the `enabled` feature off, all output compiles to nothing.
//! Port writes are privileged; off `target_os = "none"` (host tests) the
//! sink discards bytes instead of faulting.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// The port number for QEMU's debug port.
    const QEMU_DEBUG_PORT: u16 = 0x402;

    /// Write a single byte to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        #[cfg(target_os = "none")]
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") QEMU_DEBUG_PORT,
                in("al") c,
                options(nomem, nostack, preserves_flags)
            );
        }
        #[cfg(not(target_os = "none"))]
        let _ = (QEMU_DEBUG_PORT, c);
    }

    /// Write raw bytes, e.g. console output that is not valid UTF-8.
    #[inline]
    pub fn dbg_write_bytes(bytes: &[u8]) {
        for &b in bytes {
            dbg_putc(b);
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            dbg_write_bytes(s.as_bytes());
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best-effort debug output.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[inline]
    pub const fn dbg_putc(_: u8) {}

    #[inline]
    pub const fn dbg_write_bytes(_: &[u8]) {}

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(_: fmt::Arguments) {}
}

#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        // No allocation: `format_args!` builds a lightweight `Arguments`.
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
