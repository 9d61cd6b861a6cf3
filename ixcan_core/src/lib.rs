pub mod block;
pub mod compactor;
pub mod directory;
pub mod error;
pub mod format;
pub mod options;
pub mod reader;
pub mod restorer;
pub mod sink;

pub use block::is_zero;
pub use compactor::{compact, CompactSummary, Compactor};
pub use directory::{Directory, SegmentLine};
pub use error::{CanError, Result};
pub use format::{CanHeader, BLOCKS_PER_SEGMENT, BLOCK_SIZE, HEADER_SIZE, MAGIC};
pub use options::{CompactOptions, FormatOptions};
pub use reader::{CannedReader, IndexRecord};
pub use restorer::{restore, RestoreSummary, Restorer};
pub use sink::OutputSink;
