use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};

use crate::error::{AttendanceError, Result};

/// One complete JPEG cut out of the stream, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory_with_format(&self.data, image::ImageFormat::Jpeg)
            .map_err(|e| AttendanceError::Decode(e.to_string()))
    }

    /// Decodes and scales to a `size` x `size` square.
    pub fn decode_resized(&self, size: u32) -> Result<DynamicImage> {
        let image = self.decode()?;
        if image.width() == size && image.height() == size {
            return Ok(image);
        }
        Ok(image.resize_exact(size, size, FilterType::Triangle))
    }
}

pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_frame_decodes_and_resizes() {
        let image = DynamicImage::new_rgb8(64, 48);
        let jpeg = encode_jpeg(&image, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let frame = Frame::new(jpeg);
        let decoded = frame.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        let square = frame.decode_resized(32).unwrap();
        assert_eq!((square.width(), square.height()), (32, 32));
    }

    #[test]
    fn truncated_jpeg_is_a_decode_error() {
        let frame = Frame::new(vec![0xFF, 0xD8, 0x00, 0x01, 0xFF, 0xD9]);
        assert!(matches!(frame.decode(), Err(AttendanceError::Decode(_))));
    }
}
