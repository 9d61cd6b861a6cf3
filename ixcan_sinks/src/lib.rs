mod memory;
mod sparse_file;
mod zero_fill;

pub use memory::MemorySink;
pub use sparse_file::SparseFileSink;
pub use zero_fill::ZeroFillSink;

use std::fs::File;
use std::io;
use std::path::Path;

use ixcan_core::OutputSink;

/// Pick a sink for an output path.
///
/// `-` streams to stdout with explicit zeros; anything else is created as a
/// regular file whose empty runs become holes where the file system allows.
pub fn sink_for_path(path: &Path) -> io::Result<Box<dyn OutputSink>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(ZeroFillSink::new(io::stdout().lock())));
    }
    Ok(Box::new(SparseFileSink::new(File::create(path)?)))
}
