//! BGR pixel buffers and the conversions the scorers need.

use base64::Engine as _;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use thiserror::Error;

use crate::landmarks::BoundingBox;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("{operation}: buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{operation}: frame has zero area")]
    Empty { operation: &'static str },
    #[error("{operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: image::ImageError,
    },
    #[error("{operation}: invalid base64 payload: {source}")]
    Base64 {
        operation: &'static str,
        #[source]
        source: base64::DecodeError,
    },
}

/// An uploaded image that has not been decoded yet.
#[derive(Debug, Clone)]
pub enum EncodedFrame {
    /// Encoded image bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
    /// Base64 text, bare or as a data URI.
    Base64(String),
}

impl EncodedFrame {
    pub fn decode(&self) -> Result<Frame, FrameError> {
        match self {
            EncodedFrame::Bytes(bytes) => Frame::decode(bytes),
            EncodedFrame::Base64(text) => Frame::decode_base64(text),
        }
    }
}

/// One video frame, three bytes per pixel in **B, G, R** order.
///
/// The buffer reuses `image`'s `Rgb<u8>` container because resizing and
/// cropping are channel-agnostic; anything colour-dependent goes through
/// [`Frame::to_rgb`] or [`Frame::to_gray`], which swap explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: ImageBuffer<Rgb<u8>, Vec<u8>>,
}

impl Frame {
    /// Wrap a raw BGR buffer of `width * height * 3` bytes.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        const OP: &str = "wrap bgr buffer";
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { operation: OP });
        }
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        let size_error = FrameError::BufferSize {
            operation: OP,
            expected,
            actual,
        };
        if actual != expected {
            return Err(size_error);
        }
        let pixels = ImageBuffer::from_raw(width, height, data).ok_or(size_error)?;
        Ok(Self { pixels })
    }

    /// Build a frame from an RGB image, swapping to BGR.
    pub fn from_rgb(image: &RgbImage) -> Self {
        let mut pixels = image.clone();
        for pixel in pixels.pixels_mut() {
            pixel.0.swap(0, 2);
        }
        Self { pixels }
    }

    /// Decode an encoded image (JPEG, PNG, ...) into a BGR frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        const OP: &str = "decode image";
        if bytes.is_empty() {
            return Err(FrameError::Empty { operation: OP });
        }
        let image = image::load_from_memory(bytes)
            .map_err(|source| FrameError::Decode {
                operation: OP,
                source,
            })?
            .to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Empty { operation: OP });
        }
        Ok(Self::from_rgb(&image))
    }

    /// Decode a base64 image, either bare or as a `data:image/...;base64,` URI.
    pub fn decode_base64(payload: &str) -> Result<Self, FrameError> {
        const OP: &str = "decode base64 frame";
        let encoded = match payload.split_once(',') {
            Some((_, rest)) => rest,
            None => payload,
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|source| FrameError::Base64 {
                operation: OP,
                source,
            })?;
        Self::decode(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Raw BGR bytes, row-major.
    pub fn as_bgr(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// `[b, g, r]` at `(x, y)`.
    pub fn bgr_at(&self, x: u32, y: u32) -> [u8; 3] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn to_rgb(&self) -> RgbImage {
        Frame::from_rgb(&self.pixels).pixels
    }

    /// ITU-R BT.601 luma, matching the usual BGR-to-gray conversion.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let [b, g, r] = self.bgr_at(x, y);
            let luma = 0.114 * f32::from(b) + 0.587 * f32::from(g) + 0.299 * f32::from(r);
            Luma([luma.round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Mean gray level in `[0, 255]`.
    pub fn mean_brightness(&self) -> f32 {
        let gray = self.to_gray();
        let total: u64 = gray.as_raw().iter().map(|&v| u64::from(v)).sum();
        total as f32 / gray.as_raw().len() as f32
    }

    /// Crop `bbox` (already clamped to this frame) and resize to `width x height`.
    pub(crate) fn crop_resized(&self, bbox: BoundingBox, width: u32, height: u32) -> Frame {
        let cropped = imageops::crop_imm(
            &self.pixels,
            bbox.x_min,
            bbox.y_min,
            bbox.width(),
            bbox.height(),
        )
        .to_image();
        Frame {
            pixels: imageops::resize(&cropped, width, height, FilterType::Triangle),
        }
    }
}
