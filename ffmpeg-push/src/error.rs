//! Error taxonomy for the streaming pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// Output allocation, codec open, sink open or header write failed.
    #[error("connect failed: {0:#}")]
    Connect(#[source] anyhow::Error),

    /// Mid-stream codec failure.
    #[error("encode failed: {0:#}")]
    Encode(#[source] anyhow::Error),

    /// Network or sink failure while writing packets.
    #[error("write failed: {0:#}")]
    Write(#[source] anyhow::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("worker thread: {0}")]
    Worker(String),
}

impl StreamError {
    /// Whether the error ends the current session (state moves to Failed).
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Encode(_) | StreamError::Write(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
