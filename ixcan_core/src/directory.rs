use tracing::warn;

use crate::error::{CanError, Result};
use crate::format::{
    self, get_u32, magic_word, put_u32, CanHeader, BLOCKS_PER_SEGMENT, LINE_SIZE,
};
use crate::options::FormatOptions;

/// One directory line: the running count of present blocks in all earlier
/// segments, then one presence bit per block of this segment.
///
/// Bit `i` lives in `mask[i / 32]` at position `i % 32`, least significant first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentLine {
    pub running_count: u32,
    pub mask: [u32; 3],
}

impl SegmentLine {
    #[inline]
    pub fn is_set(&self, bit: u32) -> bool {
        debug_assert!((bit as u64) < BLOCKS_PER_SEGMENT);
        self.mask[(bit / 32) as usize] & (1 << (bit % 32)) != 0
    }

    #[inline]
    pub fn set(&mut self, bit: u32) {
        debug_assert!((bit as u64) < BLOCKS_PER_SEGMENT);
        self.mask[(bit / 32) as usize] |= 1 << (bit % 32);
    }

    /// Present blocks in this segment.
    #[inline]
    pub fn count_ones(&self) -> u32 {
        self.mask.iter().map(|w| w.count_ones()).sum()
    }

    /// Present blocks in this segment before `bit`.
    #[inline]
    pub fn count_below(&self, bit: u32) -> u32 {
        let word = (bit / 32) as usize;
        let full: u32 = self.mask[..word].iter().map(|w| w.count_ones()).sum();
        let low = self.mask[word] & ((1u32 << (bit % 32)) - 1);
        full + low.count_ones()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask == [0; 3]
    }

    /// A line whose running count field carries the magic instead of zero.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.running_count == magic_word() && self.is_empty()
    }

    pub fn to_bytes(&self) -> [u8; LINE_SIZE as usize] {
        let mut buf = [0u8; LINE_SIZE as usize];
        put_u32(&mut buf, 0, self.running_count);
        for (i, w) in self.mask.iter().enumerate() {
            put_u32(&mut buf, 4 + 4 * i, *w);
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            running_count: get_u32(buf, 0),
            mask: [get_u32(buf, 4), get_u32(buf, 8), get_u32(buf, 12)],
        }
    }
}

/// Presence bitmap of a canned file, one [`SegmentLine`] per 96 raw blocks.
///
/// Kept decoded in host order; [`Directory::encode`] and [`Directory::decode`]
/// are the only places the canonical byte order is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    lines: Vec<SegmentLine>,
}

impl Directory {
    /// Bytes taken by the header line plus the directory for a raw file of
    /// `original_size` bytes.
    #[inline]
    pub fn size(original_size: u64) -> u64 {
        format::directory_size(original_size)
    }

    /// An all-absent directory covering a raw file of `original_size` bytes.
    pub fn for_size(original_size: u64) -> Self {
        Self::with_segments(format::segment_count(original_size) as usize)
    }

    pub fn with_segments(n: usize) -> Self {
        Self {
            lines: vec![SegmentLine::default(); n],
        }
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn segments(&self) -> &[SegmentLine] {
        &self.lines
    }

    #[inline]
    pub fn segment(&self, segment: usize) -> &SegmentLine {
        &self.lines[segment]
    }

    /// Mark a block present. Idempotent. Panics if `segment` is out of range.
    #[inline]
    pub fn set_bit(&mut self, segment: usize, bit: u32) {
        self.lines[segment].set(bit);
    }

    #[inline]
    pub fn is_set(&self, segment: usize, bit: u32) -> bool {
        self.lines[segment].is_set(bit)
    }

    #[inline]
    pub fn running_count(&self, segment: usize) -> u32 {
        self.lines[segment].running_count
    }

    #[inline]
    pub fn set_running_count(&mut self, segment: usize, value: u32) {
        self.lines[segment].running_count = value;
    }

    /// Total set bits across all lines.
    pub fn present_blocks(&self) -> u64 {
        self.lines.iter().map(|l| l.count_ones() as u64).sum()
    }

    /// Is raw block `block` stored in the body? Out-of-range blocks are absent.
    pub fn is_present(&self, block: u64) -> bool {
        let (segment, bit) = split(block);
        self.lines.get(segment).is_some_and(|l| l.is_set(bit))
    }

    /// Position of raw block `block` among the stored blocks, in O(1).
    ///
    /// `None` when the block is absent. The running counts must already have
    /// been checked, see [`Directory::check`].
    pub fn locate(&self, block: u64) -> Option<u64> {
        let (segment, bit) = split(block);
        let line = self.lines.get(segment)?;
        if !line.is_set(bit) {
            return None;
        }
        Some(line.running_count as u64 + line.count_below(bit) as u64)
    }

    /// Replace the zero running count of every leading empty segment with the magic.
    pub fn mark_empty_segments(&mut self) {
        for line in self.lines.iter_mut() {
            if line.running_count != 0 || !line.is_empty() {
                break;
            }
            line.running_count = magic_word();
        }
    }

    /// Leading segments whose count field holds the empty-segment sentinel.
    pub fn sentinel_segments(&self) -> usize {
        self.lines
            .iter()
            .take_while(|line| line.is_sentinel())
            .count()
    }

    /// Does `line` carry the count `expected`, allowing for the empty-segment
    /// sentinel when the options enable it?
    pub fn count_matches(line: &SegmentLine, expected: u64, opts: FormatOptions) -> bool {
        if line.running_count as u64 == expected {
            return true;
        }
        opts.empty_segment_sentinel && expected == 0 && line.is_sentinel()
    }

    /// Verify the directory against its header: one line per segment, running
    /// counts telescoping, no bits past the last block. Returns the number of
    /// stored blocks the body must hold.
    pub fn check(&self, header: &CanHeader, opts: FormatOptions) -> Result<u64> {
        let blocks = header.block_count();
        let expected_lines = blocks.div_ceil(BLOCKS_PER_SEGMENT);
        if self.lines.len() as u64 != expected_lines {
            return Err(CanError::Format(format!(
                "directory has {} lines, {} blocks need {}",
                self.lines.len(),
                blocks,
                expected_lines
            )));
        }
        let mut count = 0u64;
        for (i, line) in self.lines.iter().enumerate() {
            if !Self::count_matches(line, count, opts) {
                return Err(CanError::CorruptDirectory {
                    segment: i as u64,
                    detail: format!(
                        "running count {} but {} blocks precede it",
                        line.running_count, count
                    ),
                });
            }
            count += line.count_ones() as u64;
        }
        if opts.empty_segment_sentinel {
            let sentinels = self.sentinel_segments();
            if sentinels > 0 {
                warn!(sentinels, "accepting empty-segment sentinel in leading segments");
            }
        }
        if let Some(last) = self.lines.last() {
            let used = blocks - (self.lines.len() as u64 - 1) * BLOCKS_PER_SEGMENT;
            if (used as u32..BLOCKS_PER_SEGMENT as u32).any(|bit| last.is_set(bit)) {
                return Err(CanError::CorruptDirectory {
                    segment: self.lines.len() as u64 - 1,
                    detail: format!("presence bit set past block {}", blocks - 1),
                });
            }
        }
        Ok(count)
    }

    /// Canonical on-disk form, 16 bytes per line.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.lines.len() * LINE_SIZE as usize);
        for line in &self.lines {
            out.extend_from_slice(&line.to_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() as u64 % LINE_SIZE != 0 {
            return Err(CanError::Format(format!(
                "directory length {} is not a multiple of {}",
                bytes.len(),
                LINE_SIZE
            )));
        }
        let lines = bytes
            .chunks_exact(LINE_SIZE as usize)
            .map(SegmentLine::from_bytes)
            .collect();
        Ok(Self { lines })
    }
}

/// Segment index and bit position of raw block `block`.
#[inline]
pub fn split(block: u64) -> (usize, u32) {
    (
        (block / BLOCKS_PER_SEGMENT) as usize,
        (block % BLOCKS_PER_SEGMENT) as u32,
    )
}
