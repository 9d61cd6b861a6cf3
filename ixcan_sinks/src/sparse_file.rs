use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use tracing::debug;

use ixcan_core::OutputSink;

/// Restores into a seekable file, turning runs of absent blocks into holes.
///
/// Skipping only moves the file cursor; the bytes in between are never
/// written, and the final `set_len` extends or trims the file to size. On file
/// systems without sparse support the OS fills the holes with zeros itself.
///
/// Blocks go through a `BufWriter`, which flushes before every seek.
pub struct SparseFileSink {
    file: BufWriter<File>,
}

impl SparseFileSink {
    /// `file` must be empty and positioned at its start, as from `File::create`.
    pub fn new(file: File) -> Self {
        Self {
            file: BufWriter::new(file),
        }
    }

    /// Flush pending blocks and hand back the file.
    pub fn into_inner(self) -> io::Result<File> {
        self.file.into_inner().map_err(|e| e.into_error())
    }
}

impl OutputSink for SparseFileSink {
    fn name(&self) -> &'static str {
        "sparse-file"
    }

    fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    fn skip_zeros(&mut self, len: u64) -> io::Result<()> {
        let len = i64::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "gap too large to seek over"))?;
        self.file.seek(SeekFrom::Current(len))?;
        Ok(())
    }

    fn finish(&mut self, final_len: u64) -> io::Result<()> {
        self.file.flush()?;
        let file = self.file.get_mut();
        let pos = file.stream_position()?;
        if pos != final_len {
            debug!(pos, final_len, "setting output length");
        }
        file.set_len(final_len)?;
        file.sync_all()
    }
}
