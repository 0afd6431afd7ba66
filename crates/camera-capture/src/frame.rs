//! Video frame types and processing

use image::RgbImage;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Wrap a decoded RGB image
    pub fn from_rgb_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Copy the pixels into an `image` buffer (None if the data length is inconsistent)
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Capture timestamp in milliseconds
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ns / 1_000_000
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Vec<u8> {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = (pixel[0] as f32 * 0.299
                   + pixel[1] as f32 * 0.587
                   + pixel[2] as f32 * 0.114) as u8;
            gray.push(y);
        }
        gray
    }

    /// Grayscale with a normalized (equalized) histogram, as landmark fitters expect
    pub fn to_equalized_grayscale(&self) -> Vec<u8> {
        equalize_histogram(&self.to_grayscale())
    }
}

/// Spread an 8-bit grayscale histogram over the full 0..=255 range.
///
/// Uses the cumulative distribution, anchored at the first occupied bin so the
/// darkest pixel maps to 0. A single-valued image is returned unchanged.
pub fn equalize_histogram(gray: &[u8]) -> Vec<u8> {
    let mut histogram = [0usize; 256];
    for &v in gray {
        histogram[v as usize] += 1;
    }

    let mut cdf = [0usize; 256];
    let mut running = 0;
    for (bin, count) in histogram.iter().enumerate() {
        running += count;
        cdf[bin] = running;
    }

    let total = gray.len();
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        return gray.to_vec();
    }

    let scale = 255.0 / (total - cdf_min) as f32;
    let mut lut = [0u8; 256];
    for (bin, entry) in lut.iter_mut().enumerate() {
        let shifted = cdf[bin].saturating_sub(cdf_min) as f32;
        *entry = (shifted * scale).round().clamp(0.0, 255.0) as u8;
    }

    gray.iter().map(|&v| lut[v as usize]).collect()
}
