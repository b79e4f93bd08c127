//! # NVMe Driver
//!
//! One [`NvmeDevice`] per controller, with a single admin queue pair and a
//! single I/O queue pair of [`QUEUE_SIZE`] entries each. Commands are tagged
//! with an id from a fixed table of [`MAX_COMMANDS`] slots:
//!
//! ```text
//!            start_command           completion (ISR)          free_command
//!   Free ─────────────────► InFlight ─────────────────► Completed ───────────► Free
//! ```
//!
//! The submitting task waits for its slot to leave `InFlight` by calling the
//! supplied `yield_now` hook, so every waiting operation must run in task
//! context. Completions are harvested by [`NvmeDevice::handle_interrupt`],
//! which only flips slot states and advances queue heads.
//!
//! Bring-up is split in two: [`NvmeDevice::new`] (boot context, BAR already
//! mapped) and [`NvmeDevice::probe_2`] (task context: reset, enable,
//! identify, I/O queue creation and the GPT scan).
//!
//! Reads and writes are page granular: every request is cut into 4 KiB
//! chunks, each transferred through a scratch DMA page; partial-page writes
//! read the page first.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::cast_possible_truncation)]

extern crate alloc;

mod device;
mod gpt;
mod queue;
mod regs;

pub use device::{NvmeDevice, NvmeStatus, SlotState};
pub use gpt::{GPT_SCAN_BYTES, GptError, GptPartition, MAX_PARTITIONS, parse_gpt};
pub use queue::{CompletionEntry, SubmissionEntry};
pub use regs::{MmioRegisters, NvmeRegisters, reg};

use kernel_memory_addresses::PhysicalAddress;

/// Entries per submission / completion queue.
pub const QUEUE_SIZE: usize = 64;

/// Size of the command id space.
pub const MAX_COMMANDS: usize = 128;

/// Upper bound on controllers the kernel registers.
pub const MAX_NVME_DEVICES: usize = 10;

/// One page of DMA-capable memory: the physical address the controller
/// sees and the pointer the driver uses.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmaPage {
    pub phys: PhysicalAddress,
    virt: usize,
}

impl DmaPage {
    #[must_use]
    pub fn new(phys: PhysicalAddress, virt: *mut u8) -> Self {
        Self {
            phys,
            virt: virt as usize,
        }
    }

    #[must_use]
    pub const fn as_mut_ptr(self) -> *mut u8 {
        self.virt as *mut u8
    }

    /// # Safety
    /// The page must still be allocated and not otherwise borrowed.
    #[must_use]
    pub unsafe fn bytes<'a>(self) -> &'a mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.as_mut_ptr(), 4096) }
    }
}

/// What the driver needs from the rest of the kernel.
pub trait NvmeHost {
    /// A zeroed, page-aligned DMA page.
    fn alloc_dma_page(&self) -> Option<DmaPage>;
    fn free_dma_page(&self, page: DmaPage);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum NvmeError {
    #[error("out of DMA memory")]
    OutOfMemory,
    #[error("controller not initialized")]
    NotReady,
    #[error("command {opcode:#04x} failed with status {status:#06x}")]
    CommandFailed { opcode: u8, status: u16 },
    #[error("not an I/O controller (type {0})")]
    BadControllerType(u8),
    #[error("no such partition")]
    NoSuchPartition,
    #[error("unsupported block size 2^{0}")]
    UnsupportedBlockSize(u8),
}
