//! Camera frame decoding.
//!
//! Telemetry carries each camera frame as a base64-encoded picture (JPEG
//! from the simulator). An [`ImageDecoder`] turns it into a normalized
//! [`PixelBuffer`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Scale applied to 8-bit channels before they reach a model.
pub const PIXEL_SCALE: f32 = 1.0 / 255.0;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("telemetry carried an empty image")]
    Empty,

    #[error("image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to decode image: {0}")]
    Codec(#[from] image::ImageError),

    #[error("pixel data has {actual} bytes, expected {expected}")]
    Shape { expected: usize, actual: usize },
}

/// Row-major pixels scaled to `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<f32>,
}

impl PixelBuffer {
    /// Build a buffer from raw 8-bit samples, checking the length first.
    pub fn from_raw(width: u32, height: u32, channels: u8, raw: &[u8]) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize * usize::from(channels);
        if raw.len() != expected {
            return Err(ImageError::Shape {
                expected,
                actual: raw.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data: normalize_pixels(raw),
        })
    }
}

/// Map each 8-bit sample into `0.0..=1.0`.
pub fn normalize_pixels(raw: &[u8]) -> Vec<f32> {
    raw.iter().map(|&sample| f32::from(sample) * PIXEL_SCALE).collect()
}

pub trait ImageDecoder: Send + 'static {
    fn decode(&mut self, encoded: &str) -> Result<PixelBuffer, ImageError>;
}

/// Base64 text to RGB pixels, for any format the `image` crate was built with.
#[derive(Debug, Default, Clone, Copy)]
pub struct CameraDecoder;

impl ImageDecoder for CameraDecoder {
    fn decode(&mut self, encoded: &str) -> Result<PixelBuffer, ImageError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(ImageError::Empty);
        }

        let bytes = STANDARD.decode(encoded)?;
        let rgb = image::load_from_memory(&bytes)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        PixelBuffer::from_raw(width, height, 3, rgb.as_raw())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 2x1 PNG: one black pixel, then (255, 51, 255).
    pub(crate) const TINY_PNG: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAIAAAABCAIAAAB7QOjdAAAAD0lEQVR4nGNgYGD4b/wfAARpAjJlaU58AAAAAElFTkSuQmCC";

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn normalizes_into_unit_range() {
        assert_eq!(normalize_pixels(&[0, 255]), vec![0.0, 1.0]);
        assert!(close(normalize_pixels(&[51])[0], 0.2));
    }

    #[test]
    fn pixel_buffer_checks_shape() {
        let buffer = PixelBuffer::from_raw(2, 1, 3, &[0, 0, 0, 255, 255, 255]).unwrap();
        assert_eq!(buffer.data.len(), 6);
        assert_eq!(buffer.data[3], 1.0);

        let err = PixelBuffer::from_raw(2, 2, 3, &[0; 6]).unwrap_err();
        assert!(matches!(
            err,
            ImageError::Shape {
                expected: 12,
                actual: 6
            }
        ));
    }

    #[test]
    fn camera_decoder_reads_base64_png() {
        let pixels = CameraDecoder.decode(TINY_PNG).unwrap();
        assert_eq!((pixels.width, pixels.height, pixels.channels), (2, 1, 3));

        let expected = [0.0, 0.0, 0.0, 1.0, 0.2, 1.0];
        assert_eq!(pixels.data.len(), expected.len());
        for (got, want) in pixels.data.iter().zip(expected) {
            assert!(close(*got, want), "{got} != {want}");
        }
    }

    #[test]
    fn camera_decoder_rejects_bad_input() {
        let mut decoder = CameraDecoder;
        assert!(matches!(decoder.decode(""), Err(ImageError::Empty)));
        assert!(matches!(decoder.decode("not base64!"), Err(ImageError::Base64(_))));
        // "ABC" is valid base64 but not a picture.
        assert!(matches!(decoder.decode("QUJD"), Err(ImageError::Codec(_))));
    }
}
