use crate::elf::ElfError;
use kernel_memory_addresses::VirtualAddress;
use kernel_mm::PageAllocError;
use kernel_mm::paging::MapError;
use kernel_vfs::{ResolveError, VfsError};

/// Failure to build a task or one of its resources.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("Out of physical memory")]
    OutOfMemory,
    #[error(transparent)]
    Map(#[from] MapError),
}

impl From<PageAllocError> for TaskError {
    fn from(_: PageAllocError) -> Self {
        Self::OutOfMemory
    }
}

/// A user pointer that does not reach mapped user memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UserError {
    #[error("bad user address {0:?}")]
    BadAddress(VirtualAddress),
    #[error("user string longer than {0} bytes")]
    TooLong(usize),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("no such file")]
    NotFound,
    #[error("not a regular file")]
    NotAFile,
    #[error("argument block does not fit one page")]
    ArgumentsTooLong,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Vfs(#[from] VfsError),
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl From<MapError> for ExecError {
    fn from(e: MapError) -> Self {
        Self::Task(e.into())
    }
}
