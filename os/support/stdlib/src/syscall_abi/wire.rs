//! Byte layouts written by `getdents` and `gettasks`.
//!
//! Directory entry: `[u16 record length][name][NUL]`, where the length
//! covers the whole record. Task record: `[u32 pid][u16 name length][name][NUL]`,
//! where the length covers only the name. Integers are little-endian.
//! Both calls stop at the first record that does not fit.

/// Bytes needed for a directory entry named `name`.
#[must_use]
pub const fn dirent_len(name: &[u8]) -> usize {
    2 + name.len() + 1
}

/// Write one directory entry at the start of `out`; `None` if it does not fit.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_dirent(name: &[u8], out: &mut [u8]) -> Option<usize> {
    let len = dirent_len(name);
    let record = out.get_mut(..len)?;
    record[..2].copy_from_slice(&(len as u16).to_le_bytes());
    record[2..len - 1].copy_from_slice(name);
    record[len - 1] = 0;
    Some(len)
}

/// Names in a `getdents` buffer.
#[derive(Debug, Clone)]
pub struct DirentIter<'a> {
    buf: &'a [u8],
}

impl<'a> DirentIter<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl<'a> Iterator for DirentIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.buf.get(..2)?;
        let len = usize::from(u16::from_le_bytes([header[0], header[1]]));
        if len < 3 || len > self.buf.len() {
            self.buf = &[];
            return None;
        }
        let name = &self.buf[2..len - 1];
        self.buf = &self.buf[len..];
        Some(name)
    }
}

/// Bytes needed for a task record named `name`.
#[must_use]
pub const fn task_record_len(name: &[u8]) -> usize {
    4 + 2 + name.len() + 1
}

/// Write one task record at the start of `out`; `None` if it does not fit.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode_task_record(pid: u32, name: &[u8], out: &mut [u8]) -> Option<usize> {
    let len = task_record_len(name);
    let record = out.get_mut(..len)?;
    record[..4].copy_from_slice(&pid.to_le_bytes());
    record[4..6].copy_from_slice(&(name.len() as u16).to_le_bytes());
    record[6..len - 1].copy_from_slice(name);
    record[len - 1] = 0;
    Some(len)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TaskRecord<'a> {
    pub pid: u32,
    pub name: &'a [u8],
}

/// Records in a `gettasks` buffer.
#[derive(Debug, Clone)]
pub struct TaskRecordIter<'a> {
    buf: &'a [u8],
}

impl<'a> TaskRecordIter<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl<'a> Iterator for TaskRecordIter<'a> {
    type Item = TaskRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = self.buf.get(..6)?;
        let pid = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let name_len = usize::from(u16::from_le_bytes([header[4], header[5]]));
        let len = 6 + name_len + 1;
        let Some(name) = self.buf.get(6..6 + name_len).filter(|_| len <= self.buf.len()) else {
            self.buf = &[];
            return None;
        };
        self.buf = &self.buf[len..];
        Some(TaskRecord { pid, name })
    }
}
