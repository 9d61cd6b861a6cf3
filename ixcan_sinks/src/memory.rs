use std::io;

use ixcan_core::OutputSink;

/// Restores into a `Vec<u8>`. Used by `verify` and by tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    buf: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl OutputSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn skip_zeros(&mut self, len: u64) -> io::Result<()> {
        let end = self.buf.len() as u64 + len;
        self.buf.resize(to_usize(end)?, 0);
        Ok(())
    }

    fn finish(&mut self, final_len: u64) -> io::Result<()> {
        self.buf.resize(to_usize(final_len)?, 0);
        Ok(())
    }
}

fn to_usize(n: u64) -> io::Result<usize> {
    usize::try_from(n).map_err(|_| {
        io::Error::new(io::ErrorKind::OutOfMemory, format!("{n} bytes do not fit in memory"))
    })
}
