use std::io;

/// Destination of an uncanning pass.
///
/// The restorer only ever moves forward: it writes stored blocks, asks the
/// sink to skip over runs of absent blocks, and finally fixes the length.
/// How a skipped run is realised is the sink's business, a hole in a sparse
/// file or explicit zero bytes. Either way, once [`finish`] returns, every
/// skipped byte must read back as zero and the output must be exactly
/// `final_len` bytes long.
///
/// [`finish`]: OutputSink::finish
pub trait OutputSink {
    /// Short human-readable name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Append `data` at the current position.
    fn write_block(&mut self, data: &[u8]) -> io::Result<()>;

    /// Advance the position by `len` bytes that must read as zero.
    fn skip_zeros(&mut self, len: u64) -> io::Result<()>;

    /// Set the output to exactly `final_len` bytes and flush it.
    fn finish(&mut self, final_len: u64) -> io::Result<()>;
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write_block(data)
    }

    fn skip_zeros(&mut self, len: u64) -> io::Result<()> {
        (**self).skip_zeros(len)
    }

    fn finish(&mut self, final_len: u64) -> io::Result<()> {
        (**self).finish(final_len)
    }
}
