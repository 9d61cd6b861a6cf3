use crate::error::{CanError, Result};

/// Magic bytes opening every canned index file: "IDX" followed by a NUL.
pub const MAGIC: &[u8; 4] = b"IDX\0";

/// Bytes per block of the raw index. Blocks are the unit of elision.
pub const BLOCK_SIZE: u64 = 512;

/// Blocks tracked by one directory line.
pub const BLOCKS_PER_SEGMENT: u64 = 96;

/// Size of the header line and of every directory line, in bytes.
///   header: magic[4] + directory_units:u32 + original_size:u64 = 16
///   line:   running_count:u32 + mask[3]:u32                    = 16
pub const LINE_SIZE: u64 = 16;

/// Fixed size of the canned file header in bytes.
pub const HEADER_SIZE: u64 = LINE_SIZE;

/// Raw index files are made of 16-byte (offset, size) records.
pub const RECORD_SIZE: u64 = 16;

/// Number of blocks in a raw file of `raw_size` bytes. The last one may be partial.
#[inline]
pub fn block_count(raw_size: u64) -> u64 {
    raw_size.div_ceil(BLOCK_SIZE)
}

/// Number of directory lines needed to cover a raw file of `raw_size` bytes.
#[inline]
pub fn segment_count(raw_size: u64) -> u64 {
    block_count(raw_size).div_ceil(BLOCKS_PER_SEGMENT)
}

/// Byte length of the header line plus the directory for a raw file of
/// `raw_size` bytes. Depends only on the size, never on the content.
#[inline]
pub fn directory_size(raw_size: u64) -> u64 {
    LINE_SIZE + LINE_SIZE * segment_count(raw_size)
}

// ── Canonical byte order ────────────────────────────────────────────────────

// All multi-byte fields on disk are big-endian, whatever the host.

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(b)
}

#[inline]
pub(crate) fn put_u64(buf: &mut [u8], at: usize, v: u64) {
    buf[at..at + 8].copy_from_slice(&v.to_be_bytes());
}

#[inline]
pub(crate) fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(b)
}

/// The magic read as a canonical u32, as it appears in a sentinel running count.
#[inline]
pub fn magic_word() -> u32 {
    u32::from_be_bytes(*MAGIC)
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 16-byte canned header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanHeader {
    /// Header line plus directory, in 16-byte units.
    pub directory_units: u32,
    /// Byte size of the raw index this file restores to.
    pub original_size: u64,
}

impl CanHeader {
    /// Header for a raw file of `original_size` bytes.
    pub fn for_size(original_size: u64) -> Result<Self> {
        let units = directory_size(original_size) / LINE_SIZE;
        let directory_units = u32::try_from(units).map_err(|_| {
            CanError::Format(format!(
                "raw size {original_size} needs {units} directory lines, over the u32 limit"
            ))
        })?;
        Ok(Self {
            directory_units,
            original_size,
        })
    }

    /// Total header + directory bytes as declared by this header.
    #[inline]
    pub fn directory_bytes(&self) -> u64 {
        self.directory_units as u64 * LINE_SIZE
    }

    /// Bytes of directory lines following the header line.
    #[inline]
    pub fn lines_bytes(&self) -> u64 {
        self.directory_bytes().saturating_sub(HEADER_SIZE)
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..4].copy_from_slice(MAGIC);
        put_u32(&mut buf, 4, self.directory_units);
        put_u64(&mut buf, 8, self.original_size);
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking the magic and that the
    /// declared directory size agrees with the declared original size.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        if &buf[..4] != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&buf[..4]);
            return Err(CanError::MagicMismatch { found });
        }
        let header = Self {
            directory_units: get_u32(buf, 4),
            original_size: get_u64(buf, 8),
        };
        let expected = directory_size(header.original_size);
        if header.directory_bytes() != expected {
            return Err(CanError::SizeMismatch {
                declared: header.directory_bytes(),
                expected,
                original_size: header.original_size,
            });
        }
        Ok(header)
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        block_count(self.original_size)
    }

    /// Length of the final block, `BLOCK_SIZE` unless the raw size leaves a remainder.
    #[inline]
    pub fn last_block_len(&self) -> u64 {
        match self.original_size % BLOCK_SIZE {
            0 => BLOCK_SIZE,
            rem => rem,
        }
    }

    /// Raw length of block `idx`.
    #[inline]
    pub fn block_len(&self, idx: u64) -> u64 {
        if idx + 1 == self.block_count() {
            self.last_block_len()
        } else {
            BLOCK_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_size_law() {
        assert_eq!(directory_size(0), 16);
        assert_eq!(directory_size(16), 32);
        assert_eq!(directory_size(96 * 512), 32);
        assert_eq!(directory_size(96 * 512 + 16), 48);
        assert_eq!(directory_size(50 * 512), 32);
    }

    #[test]
    fn header_bytes_are_big_endian() {
        let h = CanHeader::for_size(0x0102_0304_0506).unwrap();
        let b = h.to_bytes();
        assert_eq!(&b[..4], b"IDX\0");
        assert_eq!(&b[8..16], &[0, 0, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(CanHeader::from_bytes(&b).unwrap(), h);
    }

    #[test]
    fn header_rejects_inconsistent_sizes() {
        let mut b = CanHeader::for_size(25_600).unwrap().to_bytes();
        put_u32(&mut b, 4, 3);
        assert!(matches!(
            CanHeader::from_bytes(&b),
            Err(CanError::SizeMismatch { declared: 48, expected: 32, .. })
        ));
    }

    #[test]
    fn partial_last_block() {
        let h = CanHeader::for_size(512 * 3 + 48).unwrap();
        assert_eq!(h.block_count(), 4);
        assert_eq!(h.block_len(2), 512);
        assert_eq!(h.block_len(3), 48);
    }
}
