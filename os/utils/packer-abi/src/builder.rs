use crate::{BLOCK_SIZE, EntryKind, TarError, USTAR_MAGIC, field, header_checksum};
use alloc::vec::Vec;
use core::fmt::Write;

/// Builds a ustar archive in memory.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    out: Vec<u8>,
}

/// Split `path` into the ustar `prefix` and `name` fields.
fn split_path(path: &str) -> Result<(&str, &str), TarError> {
    if path.len() <= field::NAME.len() {
        return Ok(("", path));
    }
    path.match_indices('/')
        .map(|(i, _)| (&path[..i], &path[i + 1..]))
        .find(|(prefix, name)| {
            prefix.len() <= field::PREFIX.len() && name.len() <= field::NAME.len() && !name.is_empty()
        })
        .ok_or(TarError::NameTooLong)
}

/// Write `value` as a zero-padded, NUL-terminated octal number filling `dst`.
fn put_octal(dst: &mut [u8], value: u64) {
    struct Cursor<'a>(&'a mut [u8], usize);
    impl Write for Cursor<'_> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let end = self.1 + s.len();
            self.0.get_mut(self.1..end).ok_or(core::fmt::Error)?.copy_from_slice(s.as_bytes());
            self.1 = end;
            Ok(())
        }
    }
    let digits = dst.len() - 1;
    let mut cursor = Cursor(dst, 0);
    // the field is sized for every value written here
    let _ = write!(cursor, "{value:0digits$o}");
    cursor.0[digits] = 0;
}

impl ArchiveBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self { out: Vec::new() }
    }

    /// Append a directory entry. A trailing `/` is added to the stored name.
    ///
    /// # Errors
    /// [`TarError::NameTooLong`] if the path cannot be stored.
    pub fn add_directory(&mut self, path: &str) -> Result<(), TarError> {
        let mut name = alloc::string::String::from(path.trim_end_matches('/'));
        name.push('/');
        self.append(&name, EntryKind::Directory, &[], 0o755)
    }

    /// Append a regular file.
    ///
    /// # Errors
    /// [`TarError::NameTooLong`] if the path cannot be stored.
    pub fn add_file(&mut self, path: &str, data: &[u8]) -> Result<(), TarError> {
        self.append(path, EntryKind::File, data, 0o755)
    }

    fn append(&mut self, path: &str, kind: EntryKind, data: &[u8], mode: u64) -> Result<(), TarError> {
        let (prefix, name) = split_path(path)?;
        let mut header = [0u8; BLOCK_SIZE];
        header[field::NAME][..name.len()].copy_from_slice(name.as_bytes());
        header[field::PREFIX][..prefix.len()].copy_from_slice(prefix.as_bytes());
        put_octal(&mut header[field::MODE], mode);
        put_octal(&mut header[field::UID], 0);
        put_octal(&mut header[field::GID], 0);
        put_octal(&mut header[field::SIZE], data.len() as u64);
        put_octal(&mut header[field::MTIME], 0);
        header[field::TYPEFLAG] = kind.typeflag();
        header[field::MAGIC].copy_from_slice(USTAR_MAGIC);
        header[field::VERSION].copy_from_slice(b"00");

        let checksum = header_checksum(&header);
        put_octal(&mut header[field::CHECKSUM.start..field::CHECKSUM.end - 1], u64::from(checksum));
        header[field::CHECKSUM.end - 1] = b' ';

        self.out.extend_from_slice(&header);
        self.out.extend_from_slice(data);
        let padded = self.out.len().next_multiple_of(BLOCK_SIZE);
        self.out.resize(padded, 0);
        Ok(())
    }

    /// Terminate the archive with two zero blocks.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.out.resize(self.out.len() + 2 * BLOCK_SIZE, 0);
        self.out
    }
}
