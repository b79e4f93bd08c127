//! Access to user memory from syscall context.
//!
//! Every copy walks the task's page tables page by page instead of
//! dereferencing the user pointer, so a bad pointer turns into an error
//! code rather than a kernel page fault.

use crate::{Kernel, Pid, UserError};
use alloc::string::String;
use alloc::vec::Vec;
use kernel_info::memory::USER_STACK_TOP;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_mm::paging::translate;

/// Longest path or argument string accepted from user mode.
pub const MAX_USER_STRING: usize = 4096;

impl Kernel {
    /// Visit `len` bytes of user memory starting at `va` as kernel-visible
    /// chunks that never cross a page.
    fn user_chunks(
        &self,
        root: PhysicalAddress,
        va: u64,
        len: usize,
        mut f: impl FnMut(*mut u8, usize, usize),
    ) -> Result<(), UserError> {
        let end = va
            .checked_add(len as u64)
            .filter(|&end| end <= USER_STACK_TOP)
            .ok_or(UserError::BadAddress(VirtualAddress::new(va)))?;
        let mut at = va;
        while at < end {
            let page_end = (at & !(PAGE_SIZE - 1)) + PAGE_SIZE;
            let chunk = (page_end.min(end) - at) as usize;
            let vaddr = VirtualAddress::new(at);
            let pa = translate(self.mapper, root, vaddr).ok_or(UserError::BadAddress(vaddr))?;
            f(self.mapper.phys_to_ptr(pa), (at - va) as usize, chunk);
            at += chunk as u64;
        }
        Ok(())
    }

    /// Check that `[va, va + len)` is mapped user memory.
    pub(crate) fn check_user_range(&self, root: PhysicalAddress, va: u64, len: u64) -> Result<(), UserError> {
        let len = usize::try_from(len).map_err(|_| UserError::BadAddress(VirtualAddress::new(va)))?;
        self.user_chunks(root, va, len, |_, _, _| {})
    }

    pub(crate) fn copy_from_user(
        &self,
        root: PhysicalAddress,
        va: u64,
        buf: &mut [u8],
    ) -> Result<(), UserError> {
        let dst = buf.as_mut_ptr();
        self.user_chunks(root, va, buf.len(), |src, at, n| unsafe {
            core::ptr::copy_nonoverlapping(src, dst.add(at), n);
        })
    }

    pub(crate) fn copy_to_user(
        &self,
        root: PhysicalAddress,
        va: u64,
        bytes: &[u8],
    ) -> Result<(), UserError> {
        let src = bytes.as_ptr();
        self.user_chunks(root, va, bytes.len(), |dst, at, n| unsafe {
            core::ptr::copy_nonoverlapping(src.add(at), dst, n);
        })
    }

    /// Read a NUL-terminated string of at most [`MAX_USER_STRING`] bytes.
    /// Invalid UTF-8 is replaced.
    pub(crate) fn read_user_str(&self, root: PhysicalAddress, va: u64) -> Result<String, UserError> {
        let mut bytes = Vec::new();
        let mut byte = [0u8];
        loop {
            if bytes.len() == MAX_USER_STRING {
                return Err(UserError::TooLong(MAX_USER_STRING));
            }
            self.copy_from_user(root, va + bytes.len() as u64, &mut byte)?;
            if byte[0] == 0 {
                break;
            }
            bytes.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub(crate) fn read_user_u64(&self, root: PhysicalAddress, va: u64) -> Result<u64, UserError> {
        let mut raw = [0u8; 8];
        self.copy_from_user(root, va, &mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    fn task_root(&self, pid: Pid) -> Result<PhysicalAddress, UserError> {
        self.sched
            .lock_irq()
            .get(pid)
            .map(|t| t.root)
            .ok_or(UserError::BadAddress(VirtualAddress::zero()))
    }

    /// Copy bytes out of the address space of `pid`.
    ///
    /// # Errors
    /// If `pid` does not exist or the range is not fully mapped.
    pub fn read_user(&self, pid: Pid, va: u64, buf: &mut [u8]) -> Result<(), UserError> {
        let root = self.task_root(pid)?;
        self.copy_from_user(root, va, buf)
    }

    /// Copy bytes into the address space of `pid`.
    ///
    /// # Errors
    /// If `pid` does not exist or the range is not fully mapped.
    pub fn write_user(&self, pid: Pid, va: u64, bytes: &[u8]) -> Result<(), UserError> {
        let root = self.task_root(pid)?;
        self.copy_to_user(root, va, bytes)
    }

    /// Frame backing `va` in the address space of `pid`.
    #[must_use]
    pub fn translate_user(&self, pid: Pid, va: u64) -> Option<PhysicalAddress> {
        let root = self.task_root(pid).ok()?;
        translate(self.mapper, root, VirtualAddress::new(va))
    }
}
