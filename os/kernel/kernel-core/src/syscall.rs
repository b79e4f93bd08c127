//! The `int 0x80` table.
//!
//! Every call returns `Result<u64, i64>` internally; errors are the small
//! negative codes user space tests with `is_error`.

use crate::{Kernel, Pid, TrapFrame, UserError};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vfs::{DeviceOps, Inode, InodeId, MountError, OpenFile, ResolveError, Resolved};
use log::{debug, warn};
use stdlib::syscall_abi::{
    O_CREAT, O_TRUNCATE, SEEK_SET, Sysno, encode_dirent, encode_task_record, error,
};

type SysResult = Result<u64, i64>;

/// Most argument arrays `exec` accepts.
const MAX_ARGS: usize = 256;

fn fd(arg: u64) -> Result<u32, i64> {
    u32::try_from(arg).map_err(|_| -1)
}

fn bad_pointer(_: UserError) -> i64 {
    -1
}

impl Kernel {
    /// Handle the trapped `int 0x80` described by `frame` and store the
    /// result in `frame.rax`.
    pub fn syscall(&self, frame: &mut TrapFrame) {
        let (number, a1, a2, a3) = frame.syscall_args();
        let result = match Sysno::from_u64(number) {
            Some(sysno) => self.dispatch(sysno, frame, a1, a2, a3),
            None => {
                warn!("unknown syscall {number}");
                Ok(0)
            }
        };
        frame.rax = result.unwrap_or_else(error);
    }

    fn dispatch(&self, sysno: Sysno, frame: &mut TrapFrame, a1: u64, a2: u64, a3: u64) -> SysResult {
        match sysno {
            Sysno::Write => self.sys_write(fd(a1)?, a2, a3),
            Sysno::Read => self.sys_read(fd(a1)?, a2, a3),
            Sysno::Exit => {
                self.exit_current(a1 as u8);
                Ok(0)
            }
            Sysno::GetPid => Ok(self.current_pid().map_or(0, u64::from)),
            Sysno::SchedYield => {
                self.yield_now();
                Ok(0)
            }
            Sysno::Fork => self.fork(frame).map(u64::from).map_err(|e| {
                warn!("fork: {e}");
                -1
            }),
            Sysno::Exec => self.sys_exec(frame, a1, a2),
            Sysno::Brk => Ok(self.brk(a1)),
            Sysno::WaitPid => self.sys_waitpid(a1, a2),
            Sysno::Open => self.sys_open(a1, a2),
            Sysno::Close => self.sys_close(fd(a1)?),
            Sysno::GetDents => self.sys_getdents(fd(a1)?, a2, a3),
            Sysno::Mkdir => self.sys_mkdir(a1),
            Sysno::Lseek => self.sys_lseek(fd(a1)?, a2, a3),
            Sysno::Ftruncate => self.sys_ftruncate(fd(a1)?, a2),
            Sysno::Dup2 => self.sys_dup2(fd(a1)?, fd(a2)?),
            Sysno::GetTasks => self.sys_gettasks(a1, a2),
            Sysno::Kill => {
                let pid = Pid::try_from(a1).map_err(|_| -1)?;
                if self.kill(pid) { Ok(0) } else { Err(-1) }
            }
            Sysno::Sleep => {
                self.sleep(a1);
                Ok(0)
            }
            Sysno::Mount => self.sys_mount(a1, a2, a3),
        }
    }

    fn current_root(&self) -> Result<PhysicalAddress, i64> {
        self.sched.lock_irq().current().map(|t| t.root).ok_or(-1)
    }

    fn user_string(&self, va: u64) -> Result<String, i64> {
        let root = self.current_root()?;
        self.read_user_str(root, va).map_err(bad_pointer)
    }

    fn open_file(&self, fd: u32) -> Result<OpenFile, i64> {
        self.sched
            .lock_irq()
            .current()
            .and_then(|t| t.files.get(fd).copied())
            .ok_or(-1)
    }

    fn store_offset(&self, fd: u32, offset: u64) {
        if let Some(file) = self.sched.lock_irq().current_mut().and_then(|t| t.files.get_mut(fd)) {
            file.offset = offset;
        }
    }

    /// Copy `len` bytes from user memory, checking the range first.
    fn user_bytes(&self, va: u64, len: u64) -> Result<Vec<u8>, i64> {
        let root = self.current_root()?;
        self.check_user_range(root, va, len).map_err(bad_pointer)?;
        let mut bytes = vec![0u8; len as usize];
        self.copy_from_user(root, va, &mut bytes).map_err(bad_pointer)?;
        Ok(bytes)
    }

    fn device_of(&self, inode: InodeId) -> Option<kernel_vfs::DeviceId> {
        self.lock_vfs().inode(inode).and_then(Inode::device)
    }

    fn sys_write(&self, fd: u32, buf: u64, len: u64) -> SysResult {
        let mut file = self.open_file(fd)?;
        let data = self.user_bytes(buf, len)?;
        // device I/O may block; keep the VFS unlocked
        let written = match self.device_of(file.inode) {
            Some(device) => DeviceOps::write(self, device, file.offset, &data)
                .inspect(|&n| file.offset += n as u64)
                .map_err(|_| -1)?,
            None => self.lock_vfs().write(&mut file, &data, self).map_err(|_| -1)?,
        };
        self.store_offset(fd, file.offset);
        Ok(written as u64)
    }

    fn sys_read(&self, fd: u32, buf: u64, len: u64) -> SysResult {
        let mut file = self.open_file(fd)?;
        let root = self.current_root()?;
        self.check_user_range(root, buf, len).map_err(bad_pointer)?;
        let mut data = vec![0u8; len as usize];
        let read = match self.device_of(file.inode) {
            Some(device) => DeviceOps::read(self, device, file.offset, &mut data)
                .inspect(|&n| file.offset += n as u64)
                .map_err(|_| -1)?,
            None => self.lock_vfs().read(&mut file, &mut data, self, self).map_err(|_| -1)?,
        };
        self.store_offset(fd, file.offset);
        self.copy_to_user(root, buf, &data[..read]).map_err(bad_pointer)?;
        Ok(read as u64)
    }

    fn sys_exec(&self, frame: &mut TrapFrame, path: u64, argv: u64) -> SysResult {
        let path = self.user_string(path)?;
        let root = self.current_root()?;
        let mut args = Vec::new();
        if argv != 0 {
            for i in 0..MAX_ARGS as u64 {
                let arg = self.read_user_u64(root, argv + i * 8).map_err(bad_pointer)?;
                if arg == 0 {
                    break;
                }
                args.push(self.read_user_str(root, arg).map_err(bad_pointer)?);
            }
        }
        self.exec(frame, &path, &args).map(|()| 0).map_err(|e| {
            debug!("exec {path}: {e}");
            -1
        })
    }

    fn sys_waitpid(&self, pid: u64, status: u64) -> SysResult {
        let pid = Pid::try_from(pid).map_err(|_| -1)?;
        let code = self.waitpid(pid).ok_or(-1)?;
        if status != 0 {
            let root = self.current_root()?;
            self.copy_to_user(root, status, &u64::from(code).to_le_bytes())
                .map_err(bad_pointer)?;
        }
        Ok(u64::from(pid))
    }

    fn sys_open(&self, path: u64, flags: u64) -> SysResult {
        let path = self.user_string(path)?;
        let inode = {
            let mut vfs = self.lock_vfs();
            match vfs.resolve(&path, self) {
                Err(ResolveError::NotADir) => return Err(-1),
                Err(ResolveError::DoesntExist) => return Err(-2),
                Ok(Resolved::DoesntExist { parent, name }) => {
                    if flags & O_CREAT == 0 {
                        return Err(-3);
                    }
                    vfs.create(parent, name).map_err(|_| -4)?
                }
                Ok(Resolved::Exists { inode, .. }) => {
                    let regular = vfs.inode(inode).and_then(Inode::len).is_some();
                    if regular && flags & O_TRUNCATE != 0 {
                        vfs.truncate(inode, 0).map_err(|_| -1)?;
                    }
                    inode
                }
            }
        };
        let mut sched = self.sched.lock_irq();
        let task = sched.current_mut().ok_or(-1)?;
        Ok(u64::from(task.files.open(inode)))
    }

    fn sys_close(&self, fd: u32) -> SysResult {
        let mut sched = self.sched.lock_irq();
        let task = sched.current_mut().ok_or(-1)?;
        task.files.close(fd).map(|_| 0).ok_or(-1)
    }

    /// Records for every child of the directory, from the first one, as
    /// many as fit.
    fn sys_getdents(&self, fd: u32, buf: u64, len: u64) -> SysResult {
        let file = self.open_file(fd)?;
        let root = self.current_root()?;
        self.check_user_range(root, buf, len).map_err(bad_pointer)?;

        let mut out = vec![0u8; len as usize];
        let mut written = 0;
        {
            let vfs = self.lock_vfs();
            if !vfs.inode(file.inode).is_some_and(Inode::is_dir) {
                return Err(-2);
            }
            for dentry in vfs.children(file.inode) {
                match encode_dirent(dentry.name().as_bytes(), &mut out[written..]) {
                    Some(n) => written += n,
                    None => break,
                }
            }
        }
        self.copy_to_user(root, buf, &out[..written]).map_err(bad_pointer)?;
        Ok(written as u64)
    }

    fn sys_mkdir(&self, path: u64) -> SysResult {
        let path = self.user_string(path)?;
        let mut vfs = self.lock_vfs();
        match vfs.resolve(&path, self) {
            Err(ResolveError::NotADir) => Err(-1),
            Err(ResolveError::DoesntExist) => Err(-2),
            Ok(Resolved::Exists { .. }) => Err(-3),
            Ok(Resolved::DoesntExist { parent, name }) => vfs.mkdir(parent, name).map(|_| 0).map_err(|_| -1),
        }
    }

    fn sys_lseek(&self, fd: u32, offset: u64, whence: u64) -> SysResult {
        if whence != SEEK_SET {
            return Err(-1);
        }
        self.open_file(fd)?;
        self.store_offset(fd, offset);
        Ok(offset)
    }

    fn sys_ftruncate(&self, fd: u32, size: u64) -> SysResult {
        let file = self.open_file(fd)?;
        self.lock_vfs().truncate(file.inode, size).map(|()| 0).map_err(|_| -1)
    }

    fn sys_dup2(&self, old: u32, new: u32) -> SysResult {
        let mut sched = self.sched.lock_irq();
        let task = sched.current_mut().ok_or(-1)?;
        task.files.dup2(old, new).map(u64::from).ok_or(-1)
    }

    fn sys_gettasks(&self, buf: u64, len: u64) -> SysResult {
        let root = self.current_root()?;
        self.check_user_range(root, buf, len).map_err(bad_pointer)?;
        let tasks: Vec<(Pid, String)> = self
            .sched
            .lock_irq()
            .iter()
            .map(|t| (t.pid, t.name.clone()))
            .collect();

        let mut out = vec![0u8; len as usize];
        let mut written = 0;
        for (pid, name) in &tasks {
            match encode_task_record(*pid, name.as_bytes(), &mut out[written..]) {
                Some(n) => written += n,
                None => break,
            }
        }
        self.copy_to_user(root, buf, &out[..written]).map_err(bad_pointer)?;
        Ok(written as u64)
    }

    /// Yield until `ms` milliseconds of 100 Hz ticks have passed.
    fn sleep(&self, ms: u64) {
        let end = self.platform.ticks() + 1 + ms.saturating_sub(1) * 100 / 1000;
        while self.platform.ticks() < end {
            self.yield_now();
        }
    }

    fn sys_mount(&self, device: u64, mountpoint: u64, fstype: u64) -> SysResult {
        let device_path = self.user_string(device)?;
        let mountpoint = self.user_string(mountpoint)?;
        let fstype = self.user_string(fstype)?;

        let mut vfs = self.lock_vfs();
        let Ok(Resolved::Exists { inode: device, .. }) = vfs.resolve(&device_path, self) else {
            return Err(-1);
        };
        let Ok(Resolved::Exists { inode, dentry, .. }) = vfs.resolve(&mountpoint, self) else {
            return Err(-2);
        };
        let Some(dentry) = dentry.filter(|_| vfs.inode(inode).is_some_and(Inode::is_dir)) else {
            return Err(-3);
        };
        if fstype != "exfat" {
            return Err(-4);
        }
        match vfs.mount_exfat(device, dentry, self) {
            Ok(_) => Ok(0),
            Err(MountError::NotADirectory) => Err(-3),
            Err(MountError::NotAPartition) => Err(-10),
            Err(MountError::BadSignature) => Err(-11),
            Err(MountError::BadGeometry) => Err(-12),
            Err(MountError::Device(_)) => Err(-13),
        }
    }
}
