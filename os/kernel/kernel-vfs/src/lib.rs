//! # Virtual Filesystem
//!
//! An inode/dentry graph with pluggable backends:
//!
//! | Backend | Storage | Notes |
//! |---------|---------|-------|
//! | ramfs | 128-byte clusters on the kernel heap | root filesystem, `/dev` |
//! | exfat | a GPT partition of an NVMe namespace | read-mostly, lazily loaded |
//! | sysfs | none, rendered on every read | mounted on `/sys` |
//!
//! Device inodes bypass the backends and dispatch to [`DeviceOps`] by
//! [`DeviceId`].
//!
//! Inodes and dentries live in generational arenas and refer to each other
//! through [`InodeId`] / [`DentryId`] handles. A dentry may carry a mounted
//! inode that shadows its own during [`Vfs::resolve`]. Nothing is ever
//! removed: there is no unlink and no unmount.
//!
//! Per-task open files are kept in a [`FileTable`]; the VFS itself only
//! sees the [`OpenFile`] being read or written.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::cast_possible_truncation)]

extern crate alloc;

mod device;
mod error;
mod exfat;
mod file;
mod inode;
mod ramfs;
mod sysfs;
mod tar;
mod vfs;

pub use device::{DeviceError, DeviceId, DeviceOps, read_zero, write_zero};
pub use error::{ExtractError, MountError, ResolveError, VfsError};
pub use exfat::ExfatVolume;
pub use file::{FileTable, OpenFile};
pub use inode::{Dentry, DentryId, Inode, InodeId, InodeKind, Superblock, SuperblockId};
pub use ramfs::CLUSTER_SIZE as RAMFS_CLUSTER_SIZE;
pub use sysfs::{SysfsNode, SysfsSource};
pub use vfs::{Resolved, Vfs};

/// Longest dentry name in bytes.
pub const MAX_NAME_LEN: usize = 63;
