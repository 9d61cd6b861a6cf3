/// Format variant knobs. Both ends of a transform must agree on them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Store the magic in place of a zero running count for segments that
    /// have no present blocks and none before them. Lets a cache recognise
    /// an empty leading segment without counting bits. Off by default.
    pub empty_segment_sentinel: bool,
}

impl FormatOptions {
    pub fn with_sentinel() -> Self {
        Self {
            empty_segment_sentinel: true,
        }
    }
}

/// Options for the canning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactOptions {
    pub format: FormatOptions,
    /// Reject raw inputs whose size is not a multiple of 16.
    pub require_alignment: bool,
}

impl Default for CompactOptions {
    fn default() -> Self {
        Self {
            format: FormatOptions::default(),
            require_alignment: true,
        }
    }
}

impl CompactOptions {
    /// Accept any input size, not only whole index records.
    pub fn generic() -> Self {
        Self {
            require_alignment: false,
            ..Self::default()
        }
    }
}
