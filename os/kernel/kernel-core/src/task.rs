use alloc::string::String;
use alloc::vec::Vec;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vfs::FileTable;

pub type Pid = u32;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskState {
    Running,
    /// Not scheduled. Nothing puts a task in this state yet.
    Waiting,
    /// Exited or killed; waits to be reaped by `waitpid`.
    Zombie,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RangeKind {
    /// An ELF segment.
    Normal,
    /// Grows with `brk`.
    Heap,
    Stack,
}

/// A page-aligned user interval `[start, end)` owned by a task.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryRange {
    pub start: VirtualAddress,
    pub end: VirtualAddress,
    pub kind: RangeKind,
}

impl MemoryRange {
    #[must_use]
    pub const fn new(start: VirtualAddress, end: VirtualAddress, kind: RangeKind) -> Self {
        Self { start, end, kind }
    }

    /// Base addresses of the pages in the range.
    pub fn pages(&self) -> impl Iterator<Item = VirtualAddress> + use<> {
        let start = self.start.as_u64();
        (start..self.end.as_u64())
            .step_by(kernel_memory_addresses::PAGE_SIZE as usize)
            .map(VirtualAddress::new)
    }
}

pub struct Task {
    pub(crate) pid: Pid,
    pub(crate) name: String,
    pub(crate) state: TaskState,
    pub(crate) exit_code: u8,
    /// Saved by [`Platform::switch`](crate::Platform::switch).
    pub(crate) kernel_rsp: u64,
    /// First frame of the kernel stack.
    pub(crate) kernel_stack: PhysicalAddress,
    /// Top of the kernel stack; `rsp0` while the task runs.
    pub(crate) kernel_entry_rsp: u64,
    /// PML4 of the task's address space.
    pub(crate) root: PhysicalAddress,
    pub(crate) ranges: Vec<MemoryRange>,
    pub(crate) files: FileTable,
}

impl Task {
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.exit_code
    }

    #[must_use]
    pub const fn root(&self) -> PhysicalAddress {
        self.root
    }

    #[must_use]
    pub fn ranges(&self) -> &[MemoryRange] {
        &self.ranges
    }

    #[must_use]
    pub const fn files(&self) -> &FileTable {
        &self.files
    }

    pub(crate) fn heap_mut(&mut self) -> Option<&mut MemoryRange> {
        self.ranges.iter_mut().find(|r| r.kind == RangeKind::Heap)
    }

    /// Mark the task exited with `code`.
    pub(crate) const fn terminate(&mut self, code: u8) {
        self.state = TaskState::Zombie;
        self.exit_code = code;
    }
}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("exit_code", &self.exit_code)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_pages_step_by_page() {
        let range = MemoryRange::new(
            VirtualAddress::new(0x40_0000),
            VirtualAddress::new(0x40_3000),
            RangeKind::Normal,
        );
        let pages: Vec<u64> = range.pages().map(VirtualAddress::as_u64).collect();
        assert_eq!(pages, [0x40_0000, 0x40_1000, 0x40_2000]);
    }
}
