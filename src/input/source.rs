use crate::core::Frame;

/// Errors raised by a frame source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("frame {index} is out of range (corpus has {len} frames)")]
    OutOfRange { index: usize, len: usize },
}

/// Trait for recorded datasets that can be replayed
///
/// Implementations only need random access by index; the replay driver
/// decides order and pacing. Frames returned by [`FrameSource::frame`] are
/// owned by the caller and released right after submission.
pub trait FrameSource: Send + Sync {
    /// Human readable name of the dataset
    fn name(&self) -> &str;

    /// Number of frames in the corpus
    fn len(&self) -> usize;

    /// Whether the corpus holds no frames
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of frame `index` in seconds
    fn timestamp(&self, index: usize) -> f64;

    /// Load frame `index`
    fn frame(&self, index: usize) -> Result<Frame, SourceError>;

    /// Photometric response (inverse gamma) table, if the dataset is calibrated
    fn photometric_gamma(&self) -> Option<Vec<f32>> {
        None
    }
}
