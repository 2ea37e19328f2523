use thiserror::Error;

/// Errors from a byte-store provider (memory, disk, ...).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Filesystem or other I/O failure
    #[error("I/O error on {key}: {message}")]
    Io { key: String, message: String },

    /// The blocking worker running the operation went away
    #[error("Store worker failed: {0}")]
    Worker(String),
}

/// Errors that can occur when decoding a serialized cache record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Record ended before a field could be read
    #[error("Record truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A descriptor string had no NUL terminator
    #[error("Unterminated descriptor string at offset {0}")]
    UnterminatedString(usize),

    /// A descriptor string was not valid UTF-8
    #[error("Descriptor at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    /// The empty-flag byte was neither 0 nor 1
    #[error("Invalid empty flag {value} at offset {offset}")]
    InvalidFlag { offset: usize, value: u8 },

    /// Bytes were left over after the declared number of buffers
    #[error("{0} trailing bytes after last buffer")]
    TrailingBytes(usize),
}

/// Errors reported by the origin generator.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// The origin could not be reached or timed out; worth retrying
    #[error("Origin unavailable: {0}")]
    Unavailable(String),

    /// The origin answered but produced no buffers; worth retrying
    #[error("Origin returned no buffers for {0}")]
    Empty(String),

    /// The origin refused the descriptor; retrying will not help
    #[error("Origin rejected {descriptor}: {reason}")]
    Rejected { descriptor: String, reason: String },
}

impl GenerateError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GenerateError::Rejected { .. })
    }
}

/// Errors resolving non-tile resources (bitmaps, format descriptors).
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// No bitmap with this name is loaded
    #[error("Unknown bitmap: {0}")]
    UnknownBitmap(String),

    /// The descriptor names a resource kind that cannot be served to clients
    #[error("Resource kind cannot be served: {0}")]
    Unsupported(String),

    /// Reading the bitmap directory failed
    #[error("Failed to load bitmaps from {path}: {message}")]
    Load { path: String, message: String },

    /// The origin failed to produce a format descriptor
    #[error("Origin error: {0}")]
    Origin(#[from] GenerateError),
}
