use crate::DeviceId;
use crate::exfat::{ExfatNode, ExfatVolume};
use crate::ramfs::RamFile;
use crate::sysfs::SysfsNode;
use alloc::string::String;
use alloc::vec::Vec;
use kernel_mm::Handle;

pub type InodeId = Handle<Inode>;
pub type DentryId = Handle<Dentry>;
pub type SuperblockId = Handle<Superblock>;

#[derive(Debug)]
pub enum InodeKind {
    /// Children in creation order.
    Directory { children: Vec<DentryId> },
    Device(DeviceId),
    RegularFile { length: u64 },
}

/// Backend-private inode state.
#[derive(Debug)]
pub(crate) enum InodeData {
    None,
    Ramfs(RamFile),
    Exfat(ExfatNode),
    Sysfs(SysfsNode),
}

#[derive(Debug)]
pub struct Inode {
    pub(crate) kind: InodeKind,
    pub(crate) superblock: SuperblockId,
    pub(crate) data: InodeData,
}

impl Inode {
    #[must_use]
    pub const fn kind(&self) -> &InodeKind {
        &self.kind
    }

    #[must_use]
    pub const fn superblock(&self) -> SuperblockId {
        self.superblock
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, InodeKind::Directory { .. })
    }

    #[must_use]
    pub const fn device(&self) -> Option<DeviceId> {
        match self.kind {
            InodeKind::Device(id) => Some(id),
            _ => None,
        }
    }

    /// File length for regular files.
    #[must_use]
    pub const fn len(&self) -> Option<u64> {
        match self.kind {
            InodeKind::RegularFile { length } => Some(length),
            _ => None,
        }
    }
}

/// Name to inode binding inside a directory.
#[derive(Debug)]
pub struct Dentry {
    pub(crate) name: String,
    pub(crate) inode: InodeId,
    /// Root of a filesystem mounted here; shadows `inode`.
    pub(crate) mounted: Option<InodeId>,
}

impl Dentry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn inode(&self) -> InodeId {
        self.inode
    }

    #[must_use]
    pub const fn mounted(&self) -> Option<InodeId> {
        self.mounted
    }

    /// The inode path resolution continues into.
    #[must_use]
    pub fn target(&self) -> InodeId {
        self.mounted.unwrap_or(self.inode)
    }
}

/// One filesystem instance.
#[derive(Debug)]
pub enum Superblock {
    Ramfs,
    Sysfs,
    Exfat(ExfatVolume),
}
