//! Numbers, flags and wire formats of the `int 0x80` interface.
//!
//! The call number goes in `rax`, arguments in `rdi`, `rsi` and `rdx`, the
//! result comes back in `rax`. Failures are small negative numbers, see
//! [`is_error`].

mod wire;

pub use wire::{
    DirentIter, TaskRecord, TaskRecordIter, dirent_len, encode_dirent, encode_task_record,
    task_record_len,
};

/// `open` flag: create the file if the last path component is missing.
pub const O_CREAT: u64 = 0x1;

/// `open` flag: cut an existing regular file to zero length.
pub const O_TRUNCATE: u64 = 0x2;

/// The only `lseek` mode.
pub const SEEK_SET: u64 = 0;

/// Exit code reported for a task ended by `kill`.
pub const KILLED_EXIT_CODE: u8 = 255;

#[repr(u64)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sysno {
    Write = 1,
    Read = 2,
    Exit = 3,
    GetPid = 4,
    SchedYield = 5,
    Fork = 6,
    Exec = 7,
    Brk = 8,
    WaitPid = 9,
    Open = 10,
    Close = 11,
    GetDents = 12,
    Mkdir = 13,
    Lseek = 14,
    Ftruncate = 15,
    Dup2 = 16,
    GetTasks = 17,
    Kill = 18,
    Sleep = 19,
    Mount = 20,
}

impl Sysno {
    pub const ALL: [Self; 20] = [
        Self::Write,
        Self::Read,
        Self::Exit,
        Self::GetPid,
        Self::SchedYield,
        Self::Fork,
        Self::Exec,
        Self::Brk,
        Self::WaitPid,
        Self::Open,
        Self::Close,
        Self::GetDents,
        Self::Mkdir,
        Self::Lseek,
        Self::Ftruncate,
        Self::Dup2,
        Self::GetTasks,
        Self::Kill,
        Self::Sleep,
        Self::Mount,
    ];

    #[must_use]
    pub const fn from_u64(n: u64) -> Option<Self> {
        if n == 0 || n > Self::ALL.len() as u64 {
            return None;
        }
        Some(Self::ALL[n as usize - 1])
    }
}

/// Whether a raw syscall result is an error code (`-4095..=-1`).
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn is_error(result: u64) -> bool {
    let signed = result as i64;
    signed >= -4095 && signed <= -1
}

/// Encode a negative error code as a raw result.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn error(code: i64) -> u64 {
    code as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_round_trip() {
        for (i, sysno) in Sysno::ALL.iter().enumerate() {
            assert_eq!(*sysno as u64, i as u64 + 1);
            assert_eq!(Sysno::from_u64(*sysno as u64), Some(*sysno));
        }
        assert_eq!(Sysno::from_u64(0), None);
        assert_eq!(Sysno::from_u64(21), None);
    }

    #[test]
    fn error_range() {
        assert!(is_error(error(-1)));
        assert!(is_error(error(-4095)));
        assert!(!is_error(error(-4096)));
        assert!(!is_error(0));
        assert!(!is_error(0x7FFF_FFFF_F000));
    }
}
