use crate::core::Frame;
use crate::input::source::{FrameSource, SourceError};

/// Synthetic image sequence for running without a dataset on disk
///
/// Timestamps advance at a nominal rate with a small deterministic jitter,
/// and every frame is a moving gradient so downstream consumers see
/// changing content.
pub struct SyntheticSequence {
    name: String,
    timestamps: Vec<f64>,
    width: u32,
    height: u32,
    exposure: f32,
    gamma: Option<Vec<f32>>,
}

impl SyntheticSequence {
    /// Create a sequence of `len` frames sampled at `rate_hz`
    pub fn new(name: &str, len: usize, rate_hz: f64) -> Self {
        let period = if rate_hz > 0.0 { 1.0 / rate_hz } else { 0.0 };
        let timestamps = (0..len)
            .map(|i| {
                // +-5% of a period, repeating every 7 frames
                let jitter = (((i * 3) % 7) as f64 - 3.0) / 60.0 * period;
                if i == 0 { 0.0 } else { i as f64 * period + jitter }
            })
            .collect();

        Self::from_timestamps(name, timestamps)
    }

    /// Create a sequence with explicit timestamps
    pub fn from_timestamps(name: &str, timestamps: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            timestamps,
            width: 64,
            height: 48,
            exposure: 10.0,
            gamma: None,
        }
    }

    /// Set the generated image size
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Attach a linear photometric response table
    pub fn with_linear_gamma(mut self) -> Self {
        self.gamma = Some((0..256).map(|v| v as f32).collect());
        self
    }

    fn render(&self, index: usize, frame: &mut Frame) {
        let shift = index as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                let value = ((x + y + shift) % 256) as f32;
                frame.image[(y * self.width + x) as usize] = value;
            }
        }
    }
}

impl FrameSource for SyntheticSequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.timestamps.len()
    }

    fn timestamp(&self, index: usize) -> f64 {
        self.timestamps.get(index).copied().unwrap_or(0.0)
    }

    fn frame(&self, index: usize) -> Result<Frame, SourceError> {
        let timestamp = *self.timestamps.get(index).ok_or(SourceError::OutOfRange {
            index,
            len: self.timestamps.len(),
        })?;

        let mut frame = Frame::new(self.width, self.height, self.exposure, timestamp);
        self.render(index, &mut frame);
        Ok(frame)
    }

    fn photometric_gamma(&self) -> Option<Vec<f32>> {
        self.gamma.clone()
    }
}
