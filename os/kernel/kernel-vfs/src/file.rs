use crate::InodeId;
use alloc::collections::BTreeMap;

/// An open file description.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OpenFile {
    pub inode: InodeId,
    pub offset: u64,
}

impl OpenFile {
    #[must_use]
    pub const fn new(inode: InodeId) -> Self {
        Self { inode, offset: 0 }
    }
}

/// A task's file descriptors, ordered by number.
///
/// Cloning the table (on fork) copies every descriptor: both tasks then
/// share inodes but keep independent offsets.
#[derive(Debug, Clone, Default)]
pub struct FileTable {
    files: BTreeMap<u32, OpenFile>,
}

impl FileTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }

    /// Install `inode` under one more than the highest descriptor in use
    /// (0 for an empty table). Freed lower numbers are not reused.
    pub fn open(&mut self, inode: InodeId) -> u32 {
        let fd = self.files.last_key_value().map_or(0, |(&fd, _)| fd + 1);
        self.files.insert(fd, OpenFile::new(inode));
        fd
    }

    #[must_use]
    pub fn get(&self, fd: u32) -> Option<&OpenFile> {
        self.files.get(&fd)
    }

    pub fn get_mut(&mut self, fd: u32) -> Option<&mut OpenFile> {
        self.files.get_mut(&fd)
    }

    pub fn close(&mut self, fd: u32) -> Option<OpenFile> {
        self.files.remove(&fd)
    }

    /// Make `new` a copy of `old` (inode and offset), closing whatever `new`
    /// referred to. Returns `None` if `old` is not open.
    pub fn dup2(&mut self, old: u32, new: u32) -> Option<u32> {
        let file = *self.files.get(&old)?;
        self.files.insert(new, file);
        Some(new)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &OpenFile)> {
        self.files.iter().map(|(&fd, file)| (fd, file))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Inode;
    use kernel_mm::Arena;

    fn inodes() -> (Arena<Inode>, InodeId, InodeId) {
        use crate::{InodeKind, Superblock};
        let mut supers = Arena::new();
        let sb = supers.insert(Superblock::Ramfs);
        let mut arena = Arena::new();
        let file = || Inode {
            kind: InodeKind::RegularFile { length: 0 },
            superblock: sb,
            data: crate::inode::InodeData::None,
        };
        let a = arena.insert(file());
        let b = arena.insert(file());
        (arena, a, b)
    }

    #[test]
    fn descriptors_follow_the_highest_open_one() {
        let (_arena, a, b) = inodes();
        let mut table = FileTable::new();
        assert_eq!(table.open(a), 0);
        assert_eq!(table.open(b), 1);
        assert_eq!(table.open(a), 2);
        table.close(1);
        assert_eq!(table.open(b), 3);
        table.close(3);
        table.close(2);
        assert_eq!(table.open(b), 1);
    }

    #[test]
    fn dup2_copies_offset_and_replaces_target() {
        let (_arena, a, b) = inodes();
        let mut table = FileTable::new();
        let fa = table.open(a);
        let fb = table.open(b);
        table.get_mut(fa).unwrap().offset = 42;

        assert_eq!(table.dup2(fa, fb), Some(fb));
        assert_eq!(table.get(fb), Some(&OpenFile { inode: a, offset: 42 }));
        assert_eq!(table.dup2(7, 9), None);

        // a descriptor far above the rest moves the next number up
        table.dup2(fa, 10);
        assert_eq!(table.open(b), 11);
    }

    #[test]
    fn cloned_tables_have_independent_offsets() {
        let (_arena, a, _) = inodes();
        let mut parent = FileTable::new();
        let fd = parent.open(a);
        let mut child = parent.clone();
        child.get_mut(fd).unwrap().offset = 100;
        assert_eq!(parent.get(fd).unwrap().offset, 0);
        assert_eq!(child.get(fd).unwrap().inode, a);
    }
}
