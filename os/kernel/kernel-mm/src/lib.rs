//! # Kernel Memory Management
//!
//! Everything that owns or describes memory in the kernel:
//!
//! * [`PageAllocator`]: the physical page allocator. One status tag per 4 KiB
//!   frame of the managed RAM region, contiguous runs found by a linear
//!   first-fit scan.
//! * [`DevicePageAllocator`]: hands out virtual page ranges used as MMIO
//!   windows. Never backed by RAM, never freed.
//! * [`SlabAllocator`]: fixed-size object pools carved out of whole pages,
//!   and the [`KernelHeap`] global allocator built from them.
//! * [`paging`]: x86-64 4-level page table construction, lookup and
//!   teardown.
//! * [`Arena`]: a generational handle arena for kernel objects that are
//!   referenced from several places (inodes, dentries).
//!
//! All code that touches physical memory goes through a [`PhysMapper`]. In
//! the kernel that is the [`HhdmPhysMapper`]; host tests use
//! [`TestPhysMemory`](test_util::TestPhysMemory), a page-aligned buffer that
//! poses as RAM at a fixed fake physical base.
//!
//! ```text
//!  region base                                               region end
//!  ┌────────────┬──────────────────────────────────────────────────────┐
//!  │ PageStatus │  Free / Used pages handed out by PageAllocator        │
//!  │   array    │                                                      │
//!  └────────────┴──────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::cast_possible_truncation)]

extern crate alloc;

mod arena;
mod heap;
mod page_alloc;
pub mod paging;
mod phys_mapper;
mod slab;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use arena::{Arena, Handle};
pub use heap::KernelHeap;
pub use page_alloc::{DevicePageAllocator, FrameAlloc, PageAllocError, PageAllocator, PageStatus};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
pub use slab::{SLAB_HEADER_SIZE, SlabAllocator};
