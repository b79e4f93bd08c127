use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the page sizes the x86-64 paging hierarchy can map.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + Ord + Hash + fmt::Debug + Default
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// `log2(SIZE)`.
    const SHIFT: u32;
    /// Depth of the table holding the leaf entry for this size
    /// (0 = PML4, 1 = PDPT, 2 = PD, 3 = PT).
    const LEAF_DEPTH: usize;
}

macro_rules! page_size {
    ($(#[$doc:meta])* $name:ident, $shift:expr, $depth:expr) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;
            const LEAF_DEPTH: usize = $depth;
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

page_size!(
    /// 4 KiB page, mapped by a PT entry.
    Size4K, 12, 3
);
page_size!(
    /// 2 MiB page, mapped by a PD entry with `PS` set.
    Size2M, 21, 2
);
page_size!(
    /// 1 GiB page, mapped by a PDPT entry with `PS` set.
    Size1G, 30, 1
);
