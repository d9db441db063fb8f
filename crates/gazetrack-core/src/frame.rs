//! Grayscale frame buffer shared by every analysis stage.

use std::path::Path;

/// An 8-bit grayscale image, row-major, `width * height` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// A frame with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Convert any decoded image to grayscale (ITU-R 601 luma).
    pub fn from_image(img: &image::DynamicImage) -> Result<Self, FrameError> {
        let luma = img.to_luma8();
        let (width, height) = luma.dimensions();
        Self::new(luma.into_raw(), width, height)
    }

    /// Decode an image file from disk and convert it to grayscale.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let img = image::open(path)?;
        Self::from_image(&img)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    /// Copy the `[x, x + width) × [y, y + height)` window. The window must lie inside the frame.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> GrayFrame {
        let src_w = self.width as usize;
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * src_w + x as usize;
            data.extend_from_slice(&self.data[start..start + width as usize]);
        }
        GrayFrame { data, width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_length() {
        let result = GrayFrame::new(vec![0u8; 5], 2, 2);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 4, actual: 5 })
        ));
    }

    #[test]
    fn test_new_rejects_empty() {
        assert!(matches!(
            GrayFrame::new(vec![], 0, 4),
            Err(FrameError::Empty { .. })
        ));
    }

    #[test]
    fn test_crop_window() {
        // 4x3 frame with value = index
        let frame = GrayFrame::new((0..12).collect(), 4, 3).unwrap();
        let crop = frame.crop(1, 1, 2, 2);
        assert_eq!(crop.width, 2);
        assert_eq!(crop.height, 2);
        assert_eq!(crop.data, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_from_image_luma() {
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(3, 2, image::Luma([77])));
        let frame = GrayFrame::from_image(&img).unwrap();
        assert_eq!(frame.width, 3);
        assert_eq!(frame.height, 2);
        assert!(frame.data.iter().all(|&p| p == 77));
    }
}
