use thiserror::Error;

/// Error taxonomy for the delivery engine, split along the recovery-locality
/// lines drawn in the error-handling design: most of these are handled
/// locally by the caller (fallback, retry, reset-and-continue) rather than
/// bubbling up as process failures.
#[derive(Debug, Error)]
pub enum DataloggerError {
    #[error("ring buffer is full")]
    RingFull,

    #[error("ring buffer backlog is corrupt: {0}")]
    RingCorrupt(String),

    #[error("pending-publish table is full")]
    PendingTableFull,

    #[error("name resolution failed for {0}")]
    ResolutionFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DataloggerError>;
