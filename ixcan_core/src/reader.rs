use std::io::{Read, Seek, SeekFrom};

use crate::directory::Directory;
use crate::error::{CanError, IoContext, Result};
use crate::format::{get_u64, CanHeader, BLOCK_SIZE, HEADER_SIZE, RECORD_SIZE};
use crate::options::FormatOptions;
use crate::restorer::read_directory;

/// One 16-byte record of a raw index: where a tile lives in the data file and
/// how many bytes it takes. A zero size means the tile is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexRecord {
    pub offset: u64,
    pub size: u64,
}

/// Random-access reader for canned index files.
///
/// The header and the whole directory are loaded on open and stay resident:
/// 16 bytes per 96 raw blocks, about 1/3072 of the raw index size. After that
/// any raw block is found with one directory lookup and at most one seek.
pub struct CannedReader<R: Read + Seek> {
    file: R,
    pub header: CanHeader,
    directory: Directory,
    stored_blocks: u64,
}

impl<R: Read + Seek> CannedReader<R> {
    pub fn open(mut file: R, opts: FormatOptions) -> Result<Self> {
        file.seek(SeekFrom::Start(0))
            .ctx(|| "rewinding canned file".into())?;
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf)
            .ctx(|| "reading canned header".into())?;
        let header = CanHeader::from_bytes(&header_buf)?;

        let lines = read_directory(&mut file, &header)?;
        let directory = Directory::decode(&lines)?;
        let stored_blocks = directory.check(&header, opts)?;

        Ok(Self {
            file,
            header,
            directory,
            stored_blocks,
        })
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.header.block_count()
    }

    #[inline]
    pub fn stored_blocks(&self) -> u64 {
        self.stored_blocks
    }

    /// Number of 16-byte records in the raw index.
    #[inline]
    pub fn record_count(&self) -> u64 {
        self.header.original_size / RECORD_SIZE
    }

    /// Byte offset of raw block `idx` inside the canned file, `None` if it was elided.
    pub fn stored_offset(&self, idx: u64) -> Option<u64> {
        self.directory
            .locate(idx)
            .map(|ordinal| self.header.directory_bytes() + ordinal * BLOCK_SIZE)
    }

    /// Raw bytes of block `idx`, zero-filled when the block was elided.
    /// The last block comes back at its true, possibly shorter, length.
    pub fn read_block(&mut self, idx: u64) -> Result<Vec<u8>> {
        if idx >= self.block_count() {
            return Err(CanError::Usage(format!(
                "block index {} out of range (total {})",
                idx,
                self.block_count()
            )));
        }
        let mut raw = vec![0u8; self.header.block_len(idx) as usize];
        if let Some(offset) = self.stored_offset(idx) {
            self.file
                .seek(SeekFrom::Start(offset))
                .ctx(|| format!("seeking to stored block {idx}"))?;
            self.file
                .read_exact(&mut raw)
                .ctx(|| format!("reading stored block {idx}"))?;
        }
        Ok(raw)
    }

    /// Record `k` of the raw index, read without restoring the file.
    pub fn read_record(&mut self, k: u64) -> Result<IndexRecord> {
        if k >= self.record_count() {
            return Err(CanError::Usage(format!(
                "record {} out of range (total {})",
                k,
                self.record_count()
            )));
        }
        let byte = k * RECORD_SIZE;
        let idx = byte / BLOCK_SIZE;
        let Some(offset) = self.stored_offset(idx) else {
            return Ok(IndexRecord::default());
        };
        let mut buf = [0u8; RECORD_SIZE as usize];
        self.file
            .seek(SeekFrom::Start(offset + byte % BLOCK_SIZE))
            .ctx(|| format!("seeking to record {k}"))?;
        self.file
            .read_exact(&mut buf)
            .ctx(|| format!("reading record {k}"))?;
        Ok(IndexRecord {
            offset: get_u64(&buf, 0),
            size: get_u64(&buf, 8),
        })
    }
}
