use std::io;

use thiserror::Error;

/// Every way a canning or uncanning pass can fail. All of them end the
/// current file transform.
#[derive(Error, Debug)]
pub enum CanError {
    /// Bad invocation, detected before any file is touched.
    #[error("usage error: {0}")]
    Usage(String),

    /// Open, read, write or seek failure on either file.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Structurally invalid canned data.
    #[error("format error: {0}")]
    Format(String),

    /// The header's directory size disagrees with its original size.
    #[error(
        "header declares {declared} directory bytes, but an original size of {original_size} needs {expected}"
    )]
    SizeMismatch {
        declared: u64,
        expected: u64,
        original_size: u64,
    },

    #[error("wrong magic {found:02x?}, not a canned index file")]
    MagicMismatch { found: [u8; 4] },

    /// A running count or presence bit contradicts the blocks seen so far.
    #[error("corrupt directory at segment {segment}: {detail}")]
    CorruptDirectory { segment: u64, detail: String },

    /// Fewer bytes were available than the format requires.
    #[error("truncated input: {0}")]
    TruncatedInput(String),

    /// Raw index files are made of 16-byte records.
    #[error("input size {size} is not a multiple of 16, not an index file")]
    UnalignedInput { size: u64 },
}

pub type Result<T> = std::result::Result<T, CanError>;

impl CanError {
    /// Wrap an I/O error; a short read becomes `TruncatedInput`.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        if source.kind() == io::ErrorKind::UnexpectedEof {
            CanError::TruncatedInput(context)
        } else {
            CanError::Io { context, source }
        }
    }

    /// True for failures caused by the invocation or by the canned data itself,
    /// as opposed to the file system.
    pub fn is_usage_or_format(&self) -> bool {
        !matches!(self, CanError::Io { .. })
    }
}

/// Attach a context string to I/O results.
pub(crate) trait IoContext<T> {
    fn ctx(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn ctx(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| CanError::io(context(), e))
    }
}
