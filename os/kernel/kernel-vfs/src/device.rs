/// Identifies the driver instance behind a device inode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DeviceId {
    /// Text console `/dev/tty{n+1}`.
    Tty(u8),
    /// Raw NVMe namespace `/dev/nvme{n}`.
    Nvme(u16),
    /// GPT partition `/dev/nvme{device}p{partition+1}`.
    NvmePartition { device: u16, partition: u16 },
    /// `/dev/zero`.
    Zero,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("no such device")]
    NoSuchDevice,
    #[error("device I/O error")]
    Io,
    #[error("corrupt on-disk structure")]
    Corrupt,
}

/// Byte-addressed device access, implemented by the kernel for all
/// drivers. Calls may yield to other tasks while waiting for hardware.
pub trait DeviceOps {
    /// Read up to `buf.len()` bytes at `offset`; returns the bytes read.
    ///
    /// # Errors
    /// Unknown device or failed transfer.
    fn read(&self, device: DeviceId, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Write up to `buf.len()` bytes at `offset`; returns the bytes written.
    ///
    /// # Errors
    /// Unknown device or failed transfer.
    fn write(&self, device: DeviceId, offset: u64, buf: &[u8]) -> Result<usize, DeviceError>;
}

/// `/dev/zero` read: fills the buffer.
pub fn read_zero(buf: &mut [u8]) -> usize {
    buf.fill(0);
    buf.len()
}

/// `/dev/zero` write: swallows everything.
#[must_use]
pub const fn write_zero(buf: &[u8]) -> usize {
    buf.len()
}
