use crate::DeviceError;
use packer_abi::TarError;

/// Structural failure of [`Vfs::resolve`](crate::Vfs::resolve).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ResolveError {
    /// A path component was traversed as a directory but is not one.
    #[error("not a directory")]
    NotADir,
    /// An intermediate component is missing.
    #[error("no such file or directory")]
    DoesntExist,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VfsError {
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    #[error("not a regular file")]
    NotAFile,
    #[error("operation not implemented by the filesystem")]
    NotSupported,
    #[error("name longer than {} bytes", crate::MAX_NAME_LEN)]
    NameTooLong,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MountError {
    #[error("device is not a partition")]
    NotAPartition,
    #[error("no exFAT signature")]
    BadSignature,
    #[error("unsupported exFAT geometry")]
    BadGeometry,
    #[error("mount point is not a directory")]
    NotADirectory,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Failure while unpacking the initial ramdisk.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ExtractError {
    #[error("archive: {0}")]
    Archive(#[from] TarError),
    #[error("cannot place archive member: {0}")]
    Path(#[from] ResolveError),
    #[error("archive member already exists")]
    Exists,
    #[error(transparent)]
    Vfs(#[from] VfsError),
}
