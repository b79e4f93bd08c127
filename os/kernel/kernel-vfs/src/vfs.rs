use crate::exfat::{self, ExfatNode, ExfatVolume};
use crate::inode::InodeData;
use crate::ramfs::RamFile;
use crate::{
    Dentry, DentryId, DeviceId, DeviceOps, Inode, InodeId, InodeKind, MAX_NAME_LEN, MountError,
    OpenFile, ResolveError, Superblock, SuperblockId, SysfsNode, SysfsSource, VfsError, sysfs,
};
use alloc::string::String;
use alloc::vec::Vec;
use kernel_mm::Arena;
use log::{info, warn};

/// Outcome of a successful [`Vfs::resolve`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Resolved<'p> {
    /// The whole path exists. `dentry` is `None` only for the root.
    Exists {
        inode: InodeId,
        dentry: Option<DentryId>,
        parent: InodeId,
    },
    /// Everything but the last component exists.
    DoesntExist { parent: InodeId, name: &'p str },
}

/// The filesystem tree.
#[derive(Debug)]
pub struct Vfs {
    inodes: Arena<Inode>,
    dentries: Arena<Dentry>,
    superblocks: Arena<Superblock>,
    root: InodeId,
    dev_dir: InodeId,
    sys_dir: InodeId,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// A ramfs root holding `/dev`, with sysfs mounted on `/sys`.
    #[must_use]
    pub fn new() -> Self {
        let mut superblocks = Arena::new();
        let ramfs = superblocks.insert(Superblock::Ramfs);
        let sysfs = superblocks.insert(Superblock::Sysfs);

        let mut inodes = Arena::new();
        let root = inodes.insert(directory(ramfs));
        let mut vfs = Self {
            inodes,
            dentries: Arena::new(),
            superblocks,
            root,
            dev_dir: root,
            sys_dir: root,
        };

        vfs.dev_dir = vfs.insert_child(root, "dev", directory(ramfs));
        vfs.insert_child(root, "sys", directory(ramfs));

        let sys_dir = vfs.inodes.insert(directory(sysfs));
        for node in SysfsNode::ALL {
            let file = Inode {
                kind: InodeKind::RegularFile { length: 0 },
                superblock: sysfs,
                data: InodeData::Sysfs(node),
            };
            vfs.insert_child(sys_dir, node.name(), file);
        }
        if let Some(dentry) = vfs.dentry_of(root, "sys") {
            vfs.dentries[dentry].mounted = Some(sys_dir);
        }
        vfs.sys_dir = sys_dir;
        vfs
    }

    #[must_use]
    pub const fn root(&self) -> InodeId {
        self.root
    }

    #[must_use]
    pub const fn dev_dir(&self) -> InodeId {
        self.dev_dir
    }

    /// Root of the sysfs mount.
    #[must_use]
    pub const fn sys_dir(&self) -> InodeId {
        self.sys_dir
    }

    #[must_use]
    pub fn inode(&self, id: InodeId) -> Option<&Inode> {
        self.inodes.get(id)
    }

    #[must_use]
    pub fn dentry(&self, id: DentryId) -> Option<&Dentry> {
        self.dentries.get(id)
    }

    /// Walk `path` from the root. Consecutive and trailing slashes are
    /// ignored; an empty path names the root.
    ///
    /// # Errors
    /// [`ResolveError::NotADir`] when a non-directory is traversed,
    /// [`ResolveError::DoesntExist`] when an intermediate component is
    /// missing.
    pub fn resolve<'p>(
        &mut self,
        path: &'p str,
        devices: &dyn DeviceOps,
    ) -> Result<Resolved<'p>, ResolveError> {
        let mut parent = self.root;
        let mut current = self.root;
        let mut dentry = None;
        let mut fragments = path.split('/').filter(|f| !f.is_empty()).peekable();

        while let Some(name) = fragments.next() {
            if !self.inodes[current].is_dir() {
                return Err(ResolveError::NotADir);
            }
            let Some(found) = self.dentry_of(current, name) else {
                return if fragments.peek().is_none() {
                    Ok(Resolved::DoesntExist {
                        parent: current,
                        name,
                    })
                } else {
                    Err(ResolveError::DoesntExist)
                };
            };
            parent = current;
            current = self.dentries[found].target();
            dentry = Some(found);
            self.lookup(current, devices);
        }

        Ok(Resolved::Exists {
            inode: current,
            dentry,
            parent,
        })
    }

    /// Children of a directory in creation order.
    pub fn children(&self, dir: InodeId) -> impl Iterator<Item = &Dentry> + '_ {
        let children = match self.inodes.get(dir).map(Inode::kind) {
            Some(InodeKind::Directory { children }) => children.as_slice(),
            _ => &[],
        };
        children.iter().filter_map(|&d| self.dentries.get(d))
    }

    /// Create an empty regular file.
    ///
    /// # Errors
    /// The parent is not a directory, the name is too long or the
    /// filesystem does not support creation.
    pub fn create(&mut self, parent: InodeId, name: &str) -> Result<InodeId, VfsError> {
        let sb = self.creatable(parent, name)?;
        let file = Inode {
            kind: InodeKind::RegularFile { length: 0 },
            superblock: sb,
            data: InodeData::Ramfs(RamFile::new()),
        };
        Ok(self.insert_child(parent, name, file))
    }

    /// Create an empty directory.
    ///
    /// # Errors
    /// As for [`Vfs::create`].
    pub fn mkdir(&mut self, parent: InodeId, name: &str) -> Result<InodeId, VfsError> {
        let sb = self.creatable(parent, name)?;
        Ok(self.insert_child(parent, name, directory(sb)))
    }

    /// Create a device node.
    ///
    /// # Errors
    /// As for [`Vfs::create`].
    pub fn mknod(&mut self, parent: InodeId, name: &str, device: DeviceId) -> Result<InodeId, VfsError> {
        let sb = self.creatable(parent, name)?;
        let node = Inode {
            kind: InodeKind::Device(device),
            superblock: sb,
            data: InodeData::None,
        };
        Ok(self.insert_child(parent, name, node))
    }

    /// Read at the file's offset and advance it.
    ///
    /// # Errors
    /// Directories cannot be read; device and exFAT errors are passed on.
    pub fn read(
        &mut self,
        file: &mut OpenFile,
        buf: &mut [u8],
        devices: &dyn DeviceOps,
        sysfs: &dyn SysfsSource,
    ) -> Result<usize, VfsError> {
        let inode = self.inodes.get_mut(file.inode).ok_or(VfsError::NotAFile)?;
        let length = match inode.kind {
            InodeKind::Directory { .. } => return Err(VfsError::IsADirectory),
            InodeKind::Device(device) => {
                let n = devices.read(device, file.offset, buf)?;
                file.offset += n as u64;
                return Ok(n);
            }
            InodeKind::RegularFile { length } => length,
        };

        let n = match &mut inode.data {
            InodeData::Ramfs(ram) => ram.read(length, file.offset, buf),
            InodeData::Sysfs(node) => sysfs::read(*node, sysfs, file.offset, buf),
            InodeData::Exfat(node) => {
                let volume = exfat_volume(&self.superblocks, inode.superblock)?;
                if !node.loaded {
                    exfat::load_file(&volume, devices, node)?;
                }
                exfat::read(&volume, devices, node, length, file.offset, buf)?
            }
            InodeData::None => 0,
        };
        file.offset += n as u64;
        Ok(n)
    }

    /// Write at the file's offset and advance it. ramfs files grow as
    /// needed; exFAT writes stop at the current file length.
    ///
    /// # Errors
    /// Directories and sysfs files cannot be written.
    pub fn write(&mut self, file: &mut OpenFile, buf: &[u8], devices: &dyn DeviceOps) -> Result<usize, VfsError> {
        let inode = self.inodes.get_mut(file.inode).ok_or(VfsError::NotAFile)?;
        let length = match inode.kind {
            InodeKind::Directory { .. } => return Err(VfsError::IsADirectory),
            InodeKind::Device(device) => {
                let n = devices.write(device, file.offset, buf)?;
                file.offset += n as u64;
                return Ok(n);
            }
            InodeKind::RegularFile { length } => length,
        };

        let n = match &mut inode.data {
            InodeData::Ramfs(ram) => {
                let end = file.offset + buf.len() as u64;
                if end > length {
                    ram.set_size(end);
                    inode.kind = InodeKind::RegularFile { length: end };
                }
                ram.write(file.offset, buf)
            }
            InodeData::Exfat(node) => {
                let volume = exfat_volume(&self.superblocks, inode.superblock)?;
                if !node.loaded {
                    exfat::load_file(&volume, devices, node)?;
                }
                exfat::write(&volume, devices, node, length, file.offset, buf)?
            }
            InodeData::Sysfs(_) | InodeData::None => return Err(VfsError::NotSupported),
        };
        file.offset += n as u64;
        Ok(n)
    }

    /// Set a regular file's length.
    ///
    /// # Errors
    /// Only ramfs files can change size.
    pub fn truncate(&mut self, inode: InodeId, size: u64) -> Result<(), VfsError> {
        let inode = self.inodes.get_mut(inode).ok_or(VfsError::NotAFile)?;
        match inode.kind {
            InodeKind::Directory { .. } => return Err(VfsError::IsADirectory),
            InodeKind::Device(_) => return Err(VfsError::NotAFile),
            InodeKind::RegularFile { .. } => {}
        }
        let InodeData::Ramfs(ram) = &mut inode.data else {
            return Err(VfsError::NotSupported);
        };
        ram.set_size(size);
        inode.kind = InodeKind::RegularFile { length: size };
        Ok(())
    }

    /// Mount the exFAT volume on the partition behind `device` at
    /// `mountpoint` and return the new root directory.
    ///
    /// # Errors
    /// The device is not a partition node, the mount point is not a
    /// directory, or the boot sector is not a usable exFAT one.
    pub fn mount_exfat(
        &mut self,
        device: InodeId,
        mountpoint: DentryId,
        devices: &dyn DeviceOps,
    ) -> Result<InodeId, MountError> {
        let partition = match self.inodes.get(device).and_then(Inode::device) {
            Some(id @ DeviceId::NvmePartition { .. }) => id,
            _ => return Err(MountError::NotAPartition),
        };
        let target = self
            .dentries
            .get(mountpoint)
            .map(Dentry::target)
            .ok_or(MountError::NotADirectory)?;
        if !self.inodes[target].is_dir() {
            return Err(MountError::NotADirectory);
        }

        let mut sector = [0u8; 512];
        devices.read(partition, 0, &mut sector)?;
        let volume = ExfatVolume::from_boot_sector(partition, &sector)?;

        let sb = self.superblocks.insert(Superblock::Exfat(volume));
        let root = self.inodes.insert(Inode {
            kind: InodeKind::Directory { children: Vec::new() },
            superblock: sb,
            data: InodeData::Exfat(ExfatNode::root(volume.root_cluster)),
        });
        self.dentries[mountpoint].mounted = Some(root);
        info!(
            "Mounted exfat on {partition:?}: {} clusters of {} bytes",
            volume.cluster_count,
            volume.cluster_bytes()
        );
        self.lookup(root, devices);
        Ok(root)
    }

    /// Populate an exFAT directory on first traversal.
    fn lookup(&mut self, inode: InodeId, devices: &dyn DeviceOps) {
        let Some(Inode {
            kind: InodeKind::Directory { .. },
            superblock,
            data: InodeData::Exfat(node),
        }) = self.inodes.get(inode)
        else {
            return;
        };
        if node.loaded {
            return;
        }
        let sb = *superblock;
        let Ok(volume) = exfat_volume(&self.superblocks, sb) else {
            return;
        };
        let entries = match exfat::read_dir(&volume, devices, node) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("exfat: cannot read directory: {e}");
                return;
            }
        };

        for entry in entries {
            let kind = if entry.is_dir {
                InodeKind::Directory { children: Vec::new() }
            } else {
                InodeKind::RegularFile { length: entry.node.size }
            };
            let child = Inode {
                kind,
                superblock: sb,
                data: InodeData::Exfat(entry.node),
            };
            self.insert_child(inode, &entry.name, child);
        }
        if let InodeData::Exfat(node) = &mut self.inodes[inode].data {
            node.loaded = true;
        }
    }

    fn dentry_of(&self, dir: InodeId, name: &str) -> Option<DentryId> {
        let InodeKind::Directory { children } = &self.inodes.get(dir)?.kind else {
            return None;
        };
        children
            .iter()
            .copied()
            .find(|&d| self.dentries.get(d).is_some_and(|dentry| dentry.name == name))
    }

    /// Check that `parent` can take a new ramfs child called `name`.
    fn creatable(&self, parent: InodeId, name: &str) -> Result<SuperblockId, VfsError> {
        let inode = self.inodes.get(parent).ok_or(VfsError::NotADirectory)?;
        if !inode.is_dir() {
            return Err(VfsError::NotADirectory);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong);
        }
        match self.superblocks.get(inode.superblock) {
            Some(Superblock::Ramfs) => Ok(inode.superblock),
            _ => Err(VfsError::NotSupported),
        }
    }

    fn insert_child(&mut self, parent: InodeId, name: &str, inode: Inode) -> InodeId {
        let id = self.inodes.insert(inode);
        let dentry = self.dentries.insert(Dentry {
            name: String::from(name),
            inode: id,
            mounted: None,
        });
        if let InodeKind::Directory { children } = &mut self.inodes[parent].kind {
            children.push(dentry);
        }
        id
    }
}

fn directory(superblock: SuperblockId) -> Inode {
    Inode {
        kind: InodeKind::Directory { children: Vec::new() },
        superblock,
        data: InodeData::None,
    }
}

fn exfat_volume(superblocks: &Arena<Superblock>, sb: SuperblockId) -> Result<ExfatVolume, VfsError> {
    match superblocks.get(sb) {
        Some(Superblock::Exfat(volume)) => Ok(*volume),
        _ => Err(VfsError::NotSupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceError;

    struct NoDevices;

    impl DeviceOps for NoDevices {
        fn read(&self, _: DeviceId, _: u64, _: &mut [u8]) -> Result<usize, DeviceError> {
            Err(DeviceError::NoSuchDevice)
        }

        fn write(&self, _: DeviceId, _: u64, _: &[u8]) -> Result<usize, DeviceError> {
            Err(DeviceError::NoSuchDevice)
        }
    }

    #[test]
    fn fresh_tree_has_dev_and_sys() {
        let mut vfs = Vfs::new();
        let Ok(Resolved::Exists { inode, .. }) = vfs.resolve("/dev", &NoDevices) else {
            panic!("no /dev");
        };
        assert_eq!(inode, vfs.dev_dir());

        let Ok(Resolved::Exists { inode, .. }) = vfs.resolve("/sys", &NoDevices) else {
            panic!("no /sys");
        };
        assert_eq!(inode, vfs.sys_dir());
        let names: Vec<_> = vfs.children(inode).map(Dentry::name).collect();
        assert_eq!(names, ["pciinfo", "meminfo", "nvme"]);
    }

    #[test]
    fn root_resolves_without_a_dentry() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        for path in ["", "/", "//"] {
            assert_eq!(
                vfs.resolve(path, &NoDevices),
                Ok(Resolved::Exists {
                    inode: root,
                    dentry: None,
                    parent: root
                })
            );
        }
    }

    #[test]
    fn sysfs_rejects_creation() {
        let mut vfs = Vfs::new();
        let sys = vfs.sys_dir();
        assert_eq!(vfs.create(sys, "x"), Err(VfsError::NotSupported));
        assert_eq!(vfs.mkdir(sys, "x"), Err(VfsError::NotSupported));
    }

    #[test]
    fn names_are_bounded() {
        let mut vfs = Vfs::new();
        let root = vfs.root();
        let long = "n".repeat(MAX_NAME_LEN + 1);
        assert_eq!(vfs.create(root, &long), Err(VfsError::NameTooLong));
        assert!(vfs.create(root, &long[..MAX_NAME_LEN]).is_ok());
    }

    #[test]
    fn mount_needs_a_partition_node() {
        let mut vfs = Vfs::new();
        let dev = vfs.dev_dir();
        let zero = vfs.mknod(dev, "zero", DeviceId::Zero).unwrap();
        let Ok(Resolved::Exists { dentry: Some(sys), .. }) = vfs.resolve("/sys", &NoDevices) else {
            panic!("no /sys");
        };
        assert_eq!(vfs.mount_exfat(zero, sys, &NoDevices), Err(MountError::NotAPartition));
    }
}
