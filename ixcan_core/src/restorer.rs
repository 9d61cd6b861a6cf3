use std::io::Read;

use tracing::{debug, info};

use crate::directory::{split, Directory};
use crate::error::{CanError, IoContext, Result};
use crate::format::{CanHeader, BLOCKS_PER_SEGMENT, BLOCK_SIZE, HEADER_SIZE};
use crate::options::FormatOptions;
use crate::sink::OutputSink;

/// What an uncanning pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub original_size: u64,
    pub blocks: u64,
    /// Blocks copied from the canned body.
    pub stored_blocks: u64,
    /// Output bytes left to the sink to zero-fill.
    pub zero_bytes: u64,
}

/// Streaming uncanner.
///
/// # Open sequence
/// 1. Read the 16-byte header line.
/// 2. Check the magic and that the declared directory size is the one the
///    declared original size calls for.
/// 3. Read the directory lines and check their running counts.
///
/// Nothing is written anywhere until all three succeed, so a damaged header
/// or directory never leaves a partial output behind.
///
/// # Restore pass
/// [`restore_into`] walks every raw block in order, copying stored blocks
/// from the body and leaving the runs between them to the sink as zero gaps,
/// then hands the sink the exact original length.
///
/// [`restore_into`]: Restorer::restore_into
pub struct Restorer<R: Read> {
    input: R,
    header: CanHeader,
    directory: Directory,
    opts: FormatOptions,
    /// Blocks the body must hold, from the directory's set bits.
    stored_blocks: u64,
}

impl<R: Read> Restorer<R> {
    pub fn open(mut input: R, opts: FormatOptions) -> Result<Self> {
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        input
            .read_exact(&mut header_buf)
            .ctx(|| "reading canned header".into())?;
        let header = CanHeader::from_bytes(&header_buf)?;
        debug!(
            original_size = header.original_size,
            directory_bytes = header.directory_bytes(),
            "canned header accepted"
        );

        let lines = read_directory(&mut input, &header)?;
        let directory = Directory::decode(&lines)?;
        let stored_blocks = directory.check(&header, opts)?;
        debug!(stored_blocks, segments = directory.segment_count(), "directory accepted");

        Ok(Self {
            input,
            header,
            directory,
            opts,
            stored_blocks,
        })
    }

    #[inline]
    pub fn header(&self) -> &CanHeader {
        &self.header
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Stream the body into `sink`, reinserting the elided zero blocks.
    pub fn restore_into<S: OutputSink + ?Sized>(mut self, sink: &mut S) -> Result<RestoreSummary> {
        let original_size = self.header.original_size;
        info!(sink = sink.name(), "output size will be {}", original_size);

        let full_blocks = original_size / BLOCK_SIZE;
        let mut buf = [0u8; BLOCK_SIZE as usize];
        let mut transferred = 0u64;
        // Pending run of absent bytes, realised only when a stored block follows.
        let mut gap = 0u64;
        let mut zero_bytes = 0u64;

        let mut block = 0u64;
        while block < full_blocks {
            let (segment, _) = split(block);
            self.check_count(segment, transferred)?;
            let line = *self.directory.segment(segment);
            let bits = BLOCKS_PER_SEGMENT.min(full_blocks - block) as u32;
            for bit in 0..bits {
                if !line.is_set(bit) {
                    gap += BLOCK_SIZE;
                    continue;
                }
                if gap > 0 {
                    sink.skip_zeros(gap).ctx(|| "skipping empty blocks".into())?;
                    zero_bytes += gap;
                    gap = 0;
                }
                self.transfer(&mut buf[..], sink, block + bit as u64)?;
                transferred += 1;
            }
            block += bits as u64;
        }

        let tail = original_size % BLOCK_SIZE;
        if tail > 0 {
            let (segment, bit) = split(full_blocks);
            if bit == 0 {
                self.check_count(segment, transferred)?;
            }
            if self.directory.is_set(segment, bit) {
                if gap > 0 {
                    sink.skip_zeros(gap).ctx(|| "skipping empty blocks".into())?;
                    zero_bytes += gap;
                    gap = 0;
                }
                self.transfer(&mut buf[..tail as usize], sink, full_blocks)?;
                transferred += 1;
            } else {
                gap += tail;
            }
        }

        if transferred != self.stored_blocks {
            return Err(CanError::CorruptDirectory {
                segment: self.directory.segment_count().saturating_sub(1) as u64,
                detail: format!(
                    "{} blocks restored, directory counts {}",
                    transferred, self.stored_blocks
                ),
            });
        }
        let mut probe = [0u8; 1];
        let extra = self
            .input
            .read(&mut probe)
            .ctx(|| "checking for trailing canned data".into())?;
        if extra > 0 {
            return Err(CanError::Format(format!(
                "data past the last of {} stored blocks",
                transferred
            )));
        }

        sink.finish(original_size)
            .ctx(|| format!("setting output length to {original_size}"))?;
        zero_bytes += gap;

        let summary = RestoreSummary {
            original_size,
            blocks: self.header.block_count(),
            stored_blocks: transferred,
            zero_bytes,
        };
        info!(
            stored = summary.stored_blocks,
            blocks = summary.blocks,
            "index restored to {} bytes",
            original_size
        );
        Ok(summary)
    }

    fn check_count(&self, segment: usize, transferred: u64) -> Result<()> {
        let line = self.directory.segment(segment);
        if Directory::count_matches(line, transferred, self.opts) {
            return Ok(());
        }
        Err(CanError::CorruptDirectory {
            segment: segment as u64,
            detail: format!(
                "running count {} but {} blocks were restored before it",
                line.running_count, transferred
            ),
        })
    }

    /// Copy the next stored block, `buf.len()` bytes long, from the body to the sink.
    fn transfer<S: OutputSink + ?Sized>(&mut self, buf: &mut [u8], sink: &mut S, block: u64) -> Result<()> {
        self.input
            .read_exact(buf)
            .ctx(|| format!("reading stored block for raw block {block}"))?;
        sink.write_block(buf)
            .ctx(|| format!("writing raw block {block}"))
    }
}

/// Read the directory lines that follow the header. The buffer grows with
/// the data actually present, so a lying header cannot force a huge allocation.
pub(crate) fn read_directory<R: Read>(input: &mut R, header: &CanHeader) -> Result<Vec<u8>> {
    let want = header.lines_bytes();
    let mut lines = Vec::new();
    input
        .take(want)
        .read_to_end(&mut lines)
        .ctx(|| "reading canned directory".into())?;
    if (lines.len() as u64) < want {
        return Err(CanError::TruncatedInput(format!(
            "directory holds {} of {} bytes",
            lines.len(),
            want
        )));
    }
    Ok(lines)
}

/// Uncan `input` into `sink` in one call.
pub fn restore<R: Read, S: OutputSink + ?Sized>(
    input: R,
    sink: &mut S,
    opts: FormatOptions,
) -> Result<RestoreSummary> {
    Restorer::open(input, opts)?.restore_into(sink)
}
