use crate::input::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to create pipeline: {0}")]
    Create(String),

    #[error("pipeline {pipeline} rejected frame {index}: {reason}")]
    Submit { pipeline: String, index: usize, reason: String },

    #[error("pipeline {pipeline} failed to drain: {reason}")]
    Drain { pipeline: String, reason: String },

    #[error("processing context terminated abnormally: {0}")]
    Join(String),
}

/// Convenience alias used throughout the playback module.
pub type Result<T> = std::result::Result<T, PlaybackError>;
