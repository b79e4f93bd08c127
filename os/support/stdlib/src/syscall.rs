//! `int 0x80` wrappers.
//!
//! Every wrapper returns the raw `rax` value; check it with
//! [`is_error`](crate::syscall_abi::is_error). Paths are NUL-terminated.

use crate::syscall_abi::Sysno;
use core::ffi::CStr;

/// Longest argument vector [`exec`] forwards.
pub const MAX_ARGS: usize = 31;

#[inline(always)]
#[allow(clippy::inline_always)]
fn syscall3(sysno: Sysno, a: u64, b: u64, c: u64) -> u64 {
    let ret: u64;
    unsafe {
        core::arch::asm!(
            "int 0x80",
            inlateout("rax") sysno as u64 => ret,
            in("rdi") a,
            in("rsi") b,
            in("rdx") c,
            options(nostack)
        );
    }
    ret
}

#[inline]
pub fn write(fd: u64, buf: &[u8]) -> u64 {
    syscall3(Sysno::Write, fd, buf.as_ptr() as u64, buf.len() as u64)
}

#[inline]
pub fn read(fd: u64, buf: &mut [u8]) -> u64 {
    syscall3(Sysno::Read, fd, buf.as_mut_ptr() as u64, buf.len() as u64)
}

pub fn exit(code: u8) -> ! {
    syscall3(Sysno::Exit, u64::from(code), 0, 0);
    // a zombie is never scheduled again
    loop {
        core::hint::spin_loop();
    }
}

#[inline]
#[must_use]
pub fn getpid() -> u64 {
    syscall3(Sysno::GetPid, 0, 0, 0)
}

#[inline]
pub fn sched_yield() {
    syscall3(Sysno::SchedYield, 0, 0, 0);
}

/// Returns the child's pid in the parent and 0 in the child.
#[inline]
#[must_use]
pub fn fork() -> u64 {
    syscall3(Sysno::Fork, 0, 0, 0)
}

/// Replace the current program. Only returns on failure.
pub fn exec(path: &CStr, argv: &[&CStr]) -> u64 {
    if argv.len() > MAX_ARGS {
        return crate::syscall_abi::error(-1);
    }
    let mut pointers = [core::ptr::null::<u8>(); MAX_ARGS + 1];
    for (slot, arg) in pointers.iter_mut().zip(argv) {
        *slot = arg.as_ptr().cast();
    }
    syscall3(Sysno::Exec, path.as_ptr() as u64, pointers.as_ptr() as u64, 0)
}

/// Grow the heap to `addr`; `0` queries the current end.
#[inline]
pub fn brk(addr: u64) -> u64 {
    syscall3(Sysno::Brk, addr, 0, 0)
}

/// Wait for `pid` to exit and reap it.
#[inline]
pub fn waitpid(pid: u64, status: Option<&mut u64>) -> u64 {
    let status = status.map_or(0, |s| core::ptr::from_mut(s) as u64);
    syscall3(Sysno::WaitPid, pid, status, 0)
}

#[inline]
pub fn open(path: &CStr, flags: u64) -> u64 {
    syscall3(Sysno::Open, path.as_ptr() as u64, flags, 0)
}

#[inline]
pub fn close(fd: u64) -> u64 {
    syscall3(Sysno::Close, fd, 0, 0)
}

/// Fill `buf` with directory entries, see
/// [`DirentIter`](crate::syscall_abi::DirentIter).
#[inline]
pub fn getdents(fd: u64, buf: &mut [u8]) -> u64 {
    syscall3(Sysno::GetDents, fd, buf.as_mut_ptr() as u64, buf.len() as u64)
}

#[inline]
pub fn mkdir(path: &CStr) -> u64 {
    syscall3(Sysno::Mkdir, path.as_ptr() as u64, 0, 0)
}

#[inline]
pub fn lseek(fd: u64, offset: u64, whence: u64) -> u64 {
    syscall3(Sysno::Lseek, fd, offset, whence)
}

#[inline]
pub fn ftruncate(fd: u64, size: u64) -> u64 {
    syscall3(Sysno::Ftruncate, fd, size, 0)
}

#[inline]
pub fn dup2(old_fd: u64, new_fd: u64) -> u64 {
    syscall3(Sysno::Dup2, old_fd, new_fd, 0)
}

/// Fill `buf` with task records, see
/// [`TaskRecordIter`](crate::syscall_abi::TaskRecordIter).
#[inline]
pub fn gettasks(buf: &mut [u8]) -> u64 {
    syscall3(Sysno::GetTasks, buf.as_mut_ptr() as u64, buf.len() as u64, 0)
}

#[inline]
pub fn kill(pid: u64, sig: u64) -> u64 {
    syscall3(Sysno::Kill, pid, sig, 0)
}

#[inline]
pub fn sleep(millis: u64) -> u64 {
    syscall3(Sysno::Sleep, millis, 0, 0)
}

#[inline]
pub fn mount(device: &CStr, dir: &CStr, fs_type: &CStr) -> u64 {
    syscall3(
        Sysno::Mount,
        device.as_ptr() as u64,
        dir.as_ptr() as u64,
        fs_type.as_ptr() as u64,
    )
}
