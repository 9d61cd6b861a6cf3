use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::{debug, info};

use crate::block::is_zero_padded;
use crate::directory::{split, Directory};
use crate::error::{CanError, IoContext, Result};
use crate::format::{CanHeader, BLOCK_SIZE, RECORD_SIZE};
use crate::options::CompactOptions;

/// What a canning pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSummary {
    pub original_size: u64,
    /// Raw blocks, including a trailing partial one.
    pub blocks: u64,
    /// Blocks written to the body.
    pub stored_blocks: u64,
    /// Header line plus directory bytes.
    pub directory_bytes: u64,
    /// Total canned file length.
    pub canned_size: u64,
}

/// Streaming writer for canned index files.
///
/// # Write contract
/// Feed every raw block, in order, to [`push_block`]: full 512-byte blocks,
/// except that the last one carries only the bytes the raw file really has.
/// Call [`finish`] to write the header and directory over the placeholder.
///
/// # Format layout written
/// ```text
/// [HEADER + DIRECTORY placeholder: 16 + 16 × segments bytes of zero]
/// [BLOCK a] [BLOCK b] ...                  ← non-zero raw blocks only, in order
/// ← seek back to 0, overwrite placeholder with header and encoded directory
/// ```
///
/// [`push_block`]: Compactor::push_block
/// [`finish`]: Compactor::finish
pub struct Compactor<W: Write + Seek> {
    out: W,
    opts: CompactOptions,
    header: CanHeader,
    directory: Directory,
    /// Index of the next raw block expected.
    next_block: u64,
    stored_blocks: u64,
    /// Body bytes written after the placeholder.
    body_bytes: u64,
    /// Zero-padded copy of a trailing partial block, for classification only.
    scratch: [u8; BLOCK_SIZE as usize],
}

impl<W: Write + Seek> Compactor<W> {
    /// Start a canned file for a raw index of `raw_size` bytes, reserving the
    /// header and directory space at the start of `out`.
    pub fn create(mut out: W, raw_size: u64, opts: CompactOptions) -> Result<Self> {
        if opts.require_alignment && raw_size % RECORD_SIZE != 0 {
            return Err(CanError::UnalignedInput { size: raw_size });
        }
        let header = CanHeader::for_size(raw_size)?;
        debug!(
            raw_size,
            directory_bytes = header.directory_bytes(),
            "header will be {} bytes",
            header.directory_bytes()
        );

        out.seek(SeekFrom::Start(0))
            .ctx(|| "rewinding canned output".into())?;
        io::copy(&mut io::repeat(0).take(header.directory_bytes()), &mut out)
            .ctx(|| "reserving canned header".into())?;

        Ok(Self {
            out,
            opts,
            header,
            directory: Directory::for_size(raw_size),
            next_block: 0,
            stored_blocks: 0,
            body_bytes: 0,
            scratch: [0u8; BLOCK_SIZE as usize],
        })
    }

    /// Classify and, unless it is all zero, store the next raw block.
    pub fn push_block(&mut self, data: &[u8]) -> Result<()> {
        let idx = self.next_block;
        if idx >= self.header.block_count() {
            return Err(CanError::Usage(format!(
                "block {} pushed, raw size {} only has {}",
                idx,
                self.header.original_size,
                self.header.block_count()
            )));
        }
        let expected = self.header.block_len(idx);
        if data.len() as u64 != expected {
            return Err(CanError::Usage(format!(
                "block {} is {} bytes, expected {}",
                idx,
                data.len(),
                expected
            )));
        }

        let (segment, bit) = split(idx);
        if bit == 0 && segment > 0 {
            let count = u32::try_from(self.stored_blocks).map_err(|_| {
                CanError::Format(format!("{} stored blocks overflow a running count", self.stored_blocks))
            })?;
            self.directory.set_running_count(segment, count);
        }

        if !is_zero_padded(data, &mut self.scratch) {
            self.out
                .write_all(data)
                .ctx(|| format!("writing block {idx} to canned output"))?;
            self.directory.set_bit(segment, bit);
            self.stored_blocks += 1;
            self.body_bytes += data.len() as u64;
        }

        self.next_block += 1;
        Ok(())
    }

    /// Write the header and directory over the placeholder and flush.
    pub fn finish(mut self) -> Result<CompactSummary> {
        let blocks = self.header.block_count();
        if self.next_block != blocks {
            return Err(CanError::TruncatedInput(format!(
                "only {} of {} raw blocks were supplied",
                self.next_block, blocks
            )));
        }
        if self.opts.format.empty_segment_sentinel {
            self.directory.mark_empty_segments();
        }

        let mut head = Vec::with_capacity(self.header.directory_bytes() as usize);
        head.extend_from_slice(&self.header.to_bytes());
        head.extend_from_slice(&self.directory.encode());
        debug_assert_eq!(head.len() as u64, self.header.directory_bytes());

        self.out
            .seek(SeekFrom::Start(0))
            .ctx(|| "seeking to canned header".into())?;
        self.out
            .write_all(&head)
            .ctx(|| "writing canned header".into())?;
        self.out.flush().ctx(|| "flushing canned output".into())?;

        let summary = CompactSummary {
            original_size: self.header.original_size,
            blocks,
            stored_blocks: self.stored_blocks,
            directory_bytes: self.header.directory_bytes(),
            canned_size: self.header.directory_bytes() + self.body_bytes,
        };
        info!(
            stored = summary.stored_blocks,
            blocks = summary.blocks,
            "index packed from {} to {}",
            summary.original_size,
            summary.canned_size
        );
        Ok(summary)
    }
}

/// Can `raw_size` bytes read from `input` into `output`.
///
/// `output` is rewound and rewritten from offset 0; a stale tail past the
/// canned length is not removed, so hand in an empty or truncated file.
pub fn compact<R: Read, W: Write + Seek>(
    mut input: R,
    raw_size: u64,
    output: W,
    opts: CompactOptions,
) -> Result<CompactSummary> {
    let mut compactor = Compactor::create(output, raw_size, opts)?;
    let header = compactor.header;
    let mut buf = [0u8; BLOCK_SIZE as usize];
    for idx in 0..header.block_count() {
        let len = header.block_len(idx) as usize;
        input
            .read_exact(&mut buf[..len])
            .ctx(|| format!("reading raw block {idx}"))?;
        compactor.push_block(&buf[..len])?;
    }
    compactor.finish()
}
