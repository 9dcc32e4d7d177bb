//! Demultiplexer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("output stream read failed: {0}")]
    Io(#[from] std::io::Error),

    /// The source ended in the middle of a frame.
    #[error("output stream ended with {buffered} bytes of an incomplete frame")]
    Truncated { buffered: usize },
}
