//! RAM-resident files as a list of fixed-size clusters.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Bytes per cluster.
pub const CLUSTER_SIZE: usize = 128;

type Cluster = Box<[u8; CLUSTER_SIZE]>;

#[derive(Debug, Default)]
pub(crate) struct RamFile {
    clusters: Vec<Cluster>,
}

impl RamFile {
    pub const fn new() -> Self {
        Self {
            clusters: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Copy bytes at `offset` into `buf`, stopping at `length`.
    pub fn read(&self, length: u64, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= length {
            return 0;
        }
        let end = (offset + buf.len() as u64).min(length) as usize;
        let mut pos = offset as usize;
        while pos < end {
            let cluster = &self.clusters[pos / CLUSTER_SIZE];
            let within = pos % CLUSTER_SIZE;
            let chunk = (CLUSTER_SIZE - within).min(end - pos);
            let at = pos - offset as usize;
            buf[at..at + chunk].copy_from_slice(&cluster[within..within + chunk]);
            pos += chunk;
        }
        end - offset as usize
    }

    /// Copy `buf` to `offset`. The caller has grown the file to cover it.
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> usize {
        let mut pos = offset as usize;
        let end = pos + buf.len();
        while pos < end {
            let cluster = &mut self.clusters[pos / CLUSTER_SIZE];
            let within = pos % CLUSTER_SIZE;
            let chunk = (CLUSTER_SIZE - within).min(end - pos);
            let at = pos - offset as usize;
            cluster[within..within + chunk].copy_from_slice(&buf[at..at + chunk]);
            pos += chunk;
        }
        buf.len()
    }

    /// Grow or shrink to cover exactly `size` bytes. New clusters are
    /// zeroed; bytes past `size` in the last kept cluster are cleared so a
    /// later grow reads zeros.
    pub fn set_size(&mut self, size: u64) {
        let size = size as usize;
        let needed = size.div_ceil(CLUSTER_SIZE);
        self.clusters.truncate(needed);
        while self.clusters.len() < needed {
            self.clusters.push(Box::new([0; CLUSTER_SIZE]));
        }
        if let Some(last) = self.clusters.last_mut() {
            let within = size % CLUSTER_SIZE;
            if within != 0 {
                last[within..].fill(0);
            }
        }
    }
}
