use thiserror::Error;

/// Result type for rtsort operations
pub type Result<T> = std::result::Result<T, RtsortError>;

/// Typed failure from the metadata extractor boundary
///
/// Per-file extraction failures are recoverable: the record is skipped,
/// logged and counted, and the run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The file could not be opened or read at all
    #[error("not readable: {0}")]
    NotReadable(String),

    /// A tag required for organization is absent (e.g. PatientID)
    #[error("missing required tag: {0}")]
    MissingRequiredTag(&'static str),

    /// The file was readable but its DICOM payload could not be parsed
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
}

/// Error types for rtsort operations
///
/// Only configuration-level errors abort a run; everything per-file is
/// surfaced through report structures instead.
#[derive(Error, Debug)]
pub enum RtsortError {
    /// Metadata extraction error
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid startup configuration (bad paths, zero workers)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Worker pool construction failed
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}
