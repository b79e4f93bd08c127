//! # Kernel Core
//!
//! The hardware-independent half of the kernel. A single [`Kernel`] value
//! owns every piece of process-wide state: the task list and scheduler,
//! the VFS, the consoles, the PCI and NVMe device tables. The bare-metal
//! binary creates it once at boot and forwards interrupts, exceptions and
//! `int 0x80` traps into it.
//!
//! Everything the core needs from the CPU goes through a [`Platform`]:
//!
//! | Concern | Platform hook |
//! |---------|---------------|
//! | context switch | [`Platform::switch`] |
//! | idle | [`Platform::halt_until_interrupt`] |
//! | timer | [`Platform::ticks`] |
//! | address spaces | [`Platform::load_address_space`], [`Platform::flush_tlb`] |
//! | ring transitions | [`Platform::set_kernel_stack`], trampolines |
//! | MMIO | [`Platform::nvme_registers`] |
//!
//! Host tests substitute a recording platform and
//! `kernel_mm::test_util::TestPhysMemory` for RAM, so scheduling, fork,
//! exec and the syscall table run unmodified under `cargo test`.
//!
//! ## Scheduling
//!
//! Cooperative round robin. [`Kernel::yield_now`] is the only place a task
//! gives up the CPU; interrupt handlers never switch. A task's saved state
//! is its kernel stack pointer and whatever is pushed below it:
//!
//! ```text
//!   kernel_entry_rsp ──► ┌──────────────────────┐ (top of the 2-page stack)
//!                        │ TrapFrame (iret + 15 │
//!                        │ GPRs) while trapped  │
//!                        ├──────────────────────┤
//!                        │ return into the trap │
//!                        │ path or a trampoline │
//!                        ├──────────────────────┤
//!   kernel_rsp ────────► │ 6 callee-saved regs  │
//!                        └──────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::cast_possible_truncation)]

extern crate alloc;

mod boot;
mod devices;
pub mod elf;
mod error;
mod fault;
mod frame;
mod kernel;
pub mod keyboard;
mod platform;
mod process;
mod sched;
mod syscall;
mod task;
pub mod tty;
mod user;

pub use error::{ExecError, TaskError, UserError};
pub use fault::Exception;
pub use frame::{CALLEE_SAVED_SLOTS, TrapFrame};
pub use kernel::Kernel;
pub use platform::Platform;
pub use sched::Scheduler;
pub use task::{MemoryRange, Pid, RangeKind, Task, TaskState};

/// Number of text consoles, `/dev/tty1` to `/dev/tty3`.
pub const TTY_COUNT: usize = 3;
