//! Synthetic files rendering live kernel state.

use alloc::string::String;

/// The files under `/sys`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SysfsNode {
    /// One `Pci(..)` line per enumerated function.
    PciInfo,
    /// Physical memory totals in KiB.
    MemInfo,
    /// One `Nvme(..)` line per controller.
    Nvme,
}

impl SysfsNode {
    pub const ALL: [Self; 3] = [Self::PciInfo, Self::MemInfo, Self::Nvme];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PciInfo => "pciinfo",
            Self::MemInfo => "meminfo",
            Self::Nvme => "nvme",
        }
    }
}

/// Renders a node's current contents.
pub trait SysfsSource {
    fn render(&self, node: SysfsNode, out: &mut String);
}

/// Render `node` into `buf`, truncating. Reads at a non-zero offset return
/// nothing: every read produces a fresh snapshot.
pub(crate) fn read(node: SysfsNode, source: &dyn SysfsSource, offset: u64, buf: &mut [u8]) -> usize {
    if offset > 0 {
        return 0;
    }
    let mut text = String::new();
    source.render(node, &mut text);
    let len = text.len().min(buf.len());
    buf[..len].copy_from_slice(&text.as_bytes()[..len]);
    len
}
