//! Unpacking the initial ramdisk into the ramfs root.

use crate::{DeviceOps, ExtractError, Inode, OpenFile, Resolved, Vfs};
use log::debug;
use packer_abi::{Archive, EntryKind};

impl Vfs {
    /// Create every directory and regular file of a ustar archive under
    /// the root, returning the number of members placed. Directories that
    /// already exist are kept; every non-directory member becomes a regular
    /// file.
    ///
    /// # Errors
    /// A malformed archive, a member whose parent is missing, or a file
    /// that already exists.
    pub fn extract_tar(&mut self, archive: &[u8], devices: &dyn DeviceOps) -> Result<usize, ExtractError> {
        let mut placed = 0;
        let mut path_buf = [0u8; 256];
        for entry in Archive::new(archive).entries() {
            let entry = entry?;
            let path = entry.path(&mut path_buf);
            let path = path.strip_prefix("./").unwrap_or(path);
            if path.is_empty() || path == "." {
                continue;
            }

            match (entry.kind, self.resolve(path, devices)?) {
                (EntryKind::Directory, Resolved::Exists { inode, .. }) => {
                    if !self.inode(inode).is_some_and(Inode::is_dir) {
                        return Err(ExtractError::Exists);
                    }
                }
                (EntryKind::Directory, Resolved::DoesntExist { parent, name }) => {
                    self.mkdir(parent, name)?;
                    placed += 1;
                }
                (_, Resolved::Exists { .. }) => return Err(ExtractError::Exists),
                (_, Resolved::DoesntExist { parent, name }) => {
                    let inode = self.create(parent, name)?;
                    let mut file = OpenFile::new(inode);
                    self.write(&mut file, entry.data, devices)?;
                    debug!("initrd: {path} ({} bytes)", entry.data.len());
                    placed += 1;
                }
            }
        }
        Ok(placed)
    }
}
