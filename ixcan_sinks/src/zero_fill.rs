use std::io::{self, Read, Write};

use ixcan_core::OutputSink;

/// Restores into any forward-only writer, spelling out every zero byte.
///
/// This is the only option for pipes, where neither seeking nor truncating is
/// possible. The output can grow to its final length but never shrink.
pub struct ZeroFillSink<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> ZeroFillSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn zeros(&mut self, len: u64) -> io::Result<()> {
        let n = io::copy(&mut io::repeat(0).take(len), &mut self.out)?;
        self.written += n;
        Ok(())
    }
}

impl<W: Write> OutputSink for ZeroFillSink<W> {
    fn name(&self) -> &'static str {
        "zero-fill"
    }

    fn write_block(&mut self, data: &[u8]) -> io::Result<()> {
        self.out.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn skip_zeros(&mut self, len: u64) -> io::Result<()> {
        self.zeros(len)
    }

    fn finish(&mut self, final_len: u64) -> io::Result<()> {
        if self.written > final_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} bytes already written, cannot shrink a stream to {}",
                    self.written, final_len
                ),
            ));
        }
        self.zeros(final_len - self.written)?;
        self.out.flush()
    }
}
