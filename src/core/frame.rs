/// One timestamped sensor sample pulled from a dataset
#[derive(Debug, Clone)]
pub struct Frame {
    /// Grayscale intensities, row-major
    pub image: Vec<f32>,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Exposure time in milliseconds (0 when unknown)
    pub exposure: f32,

    /// Capture timestamp in seconds
    pub timestamp: f64,
}

impl Frame {
    pub fn new(width: u32, height: u32, exposure: f32, timestamp: f64) -> Self {
        Self {
            image: vec![0.0; (width as usize) * (height as usize)],
            width,
            height,
            exposure,
            timestamp,
        }
    }

    /// Number of pixels in the image buffer
    pub fn pixel_count(&self) -> usize {
        self.image.len()
    }

    /// Mean intensity, handy for quick sanity logging
    pub fn mean_intensity(&self) -> f32 {
        if self.image.is_empty() {
            return 0.0;
        }
        self.image.iter().sum::<f32>() / self.image.len() as f32
    }
}
