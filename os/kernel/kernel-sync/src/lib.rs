//! # Kernel synchronization primitives
//!
//! The kernel runs on a single core with cooperative scheduling, so the only
//! true concurrency is between task code and interrupt handlers. State
//! shared with a handler is guarded by a [`SpinLock`] taken through
//! [`SpinLock::lock_irq`], which masks interrupts for the critical section.
//! Locks are never held across a task switch.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;
mod sync_once_cell;

pub use irq::IrqGuard;
pub use spin_lock::{IrqSpinLockGuard, SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
