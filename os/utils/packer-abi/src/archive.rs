use crate::{BLOCK_SIZE, EntryKind, TarError, USTAR_MAGIC, data_blocks, field, header_checksum, parse_octal};

/// Zero-copy view of a tar archive in memory.
#[derive(Debug, Copy, Clone)]
pub struct Archive<'a> {
    blob: &'a [u8],
}

/// One archive member.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Entry<'a> {
    /// Path as stored; for ustar headers with a prefix this is only the
    /// `name` part, see [`Entry::prefix`].
    pub name: &'a str,
    /// ustar `prefix`, empty for plain headers.
    pub prefix: &'a str,
    pub kind: EntryKind,
    pub data: &'a [u8],
}

impl Entry<'_> {
    /// Write the full path (`prefix/name`) into `out` without a trailing
    /// slash and return it.
    pub fn path<'b>(&self, out: &'b mut [u8; 256]) -> &'b str {
        let mut len = 0;
        let mut push = |s: &str| {
            let bytes = s.as_bytes();
            out[len..len + bytes.len()].copy_from_slice(bytes);
            len += bytes.len();
        };
        if !self.prefix.is_empty() {
            push(self.prefix);
            push("/");
        }
        push(self.name);
        while len > 1 && out[len - 1] == b'/' {
            len -= 1;
        }
        // both halves are valid UTF-8 and only ASCII '/' was added or removed
        core::str::from_utf8(&out[..len]).unwrap_or_default()
    }
}

/// Iterator over archive members; stops at the first zero block or error.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    blob: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> Archive<'a> {
    #[must_use]
    pub const fn new(blob: &'a [u8]) -> Self {
        Self { blob }
    }

    #[must_use]
    pub const fn entries(&self) -> Entries<'a> {
        Entries {
            blob: self.blob,
            offset: 0,
            done: false,
        }
    }

    /// Find a member by its full path.
    #[must_use]
    pub fn find(&self, needle: &str) -> Option<Entry<'a>> {
        let mut buf = [0u8; 256];
        self.entries()
            .flatten()
            .find(|entry| entry.path(&mut buf) == needle.trim_end_matches('/'))
    }
}

fn text(bytes: &[u8]) -> Result<&str, TarError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..end]).map_err(|_| TarError::Utf8)
}

impl<'a> Entries<'a> {
    fn parse(&mut self) -> Result<Option<Entry<'a>>, TarError> {
        let Some(block) = self.blob.get(self.offset..self.offset + BLOCK_SIZE) else {
            // a missing end-of-archive marker is tolerated
            return if self.offset >= self.blob.len() {
                Ok(None)
            } else {
                Err(TarError::Truncated)
            };
        };
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        let block: &[u8; BLOCK_SIZE] = block.try_into().map_err(|_| TarError::Truncated)?;

        let stored = parse_octal(&block[field::CHECKSUM])?;
        if stored != u64::from(header_checksum(block)) {
            return Err(TarError::BadChecksum);
        }

        let size = parse_octal(&block[field::SIZE])?;
        let name = text(&block[field::NAME])?;
        let prefix = if &block[field::MAGIC] == USTAR_MAGIC {
            text(&block[field::PREFIX])?
        } else {
            ""
        };

        let data_start = self.offset + BLOCK_SIZE;
        let data_end = usize::try_from(size)
            .ok()
            .and_then(|size| data_start.checked_add(size))
            .ok_or(TarError::Truncated)?;
        let data = self.blob.get(data_start..data_end).ok_or(TarError::Truncated)?;

        self.offset = data_start + data_blocks(size) as usize * BLOCK_SIZE;
        Ok(Some(Entry {
            name,
            prefix,
            kind: EntryKind::from_typeflag(block[field::TYPEFLAG]),
            data,
        }))
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<Entry<'a>, TarError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.parse() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl core::iter::FusedIterator for Entries<'_> {}
