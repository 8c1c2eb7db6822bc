//! Pixel-format normalization and face cropping.
//!
//! Everything downstream of this module works on packed 8-bit RGB.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageFormatError {
    #[error("image has zero dimensions ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("pixel buffer too short for {width}x{height}x{channels}: expected {expected}, got {actual}")]
    BufferLength {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported channel count: {0} (need 1, 3 or 4)")]
    UnsupportedChannels(u8),
}

/// Byte order of a packed colour buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// A raw interleaved frame as it arrives from a video source.
#[derive(Debug, Clone)]
pub struct PixelFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel: 1 (grayscale), 3 or 4 (with alpha, ignored).
    pub channels: u8,
    pub order: ChannelOrder,
}

impl PixelFrame {
    /// Convert to packed RGB.
    pub fn to_rgb(&self) -> Result<RgbImage, ImageFormatError> {
        rgb_from_raw(&self.data, self.width, self.height, self.channels, self.order)
    }

    /// Build a 3-channel frame in `order` from an RGB image.
    pub fn from_rgb(image: &RgbImage, order: ChannelOrder) -> Self {
        let mut data = image.as_raw().clone();
        if order == ChannelOrder::Bgr {
            swap_red_blue(&mut data);
        }
        Self {
            data,
            width: image.width(),
            height: image.height(),
            channels: 3,
            order,
        }
    }
}

/// Normalize any decoded image to 3-channel RGB. Grayscale, grayscale+alpha,
/// RGBA and 16-bit/float sources are converted, not rejected.
pub fn normalize(image: &DynamicImage) -> Result<RgbImage, ImageFormatError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ImageFormatError::Empty { width, height });
    }
    Ok(match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    })
}

/// Interpret an interleaved buffer as an image and convert it to RGB.
pub fn rgb_from_raw(
    data: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    order: ChannelOrder,
) -> Result<RgbImage, ImageFormatError> {
    if width == 0 || height == 0 {
        return Err(ImageFormatError::Empty { width, height });
    }
    if !matches!(channels, 1 | 3 | 4) {
        return Err(ImageFormatError::UnsupportedChannels(channels));
    }

    let pixels = width as usize * height as usize;
    let expected = pixels * channels as usize;
    if data.len() < expected {
        return Err(ImageFormatError::BufferLength {
            width,
            height,
            channels,
            expected,
            actual: data.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    match channels {
        1 => {
            for &y in &data[..pixels] {
                rgb.extend_from_slice(&[y, y, y]);
            }
        }
        _ => {
            for px in data[..expected].chunks_exact(channels as usize) {
                match order {
                    ChannelOrder::Rgb => rgb.extend_from_slice(&[px[0], px[1], px[2]]),
                    ChannelOrder::Bgr => rgb.extend_from_slice(&[px[2], px[1], px[0]]),
                }
            }
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(ImageFormatError::BufferLength {
        width,
        height,
        channels: 3,
        expected: pixels * 3,
        actual: 0,
    })
}

/// Swap R and B in a packed 3-channel buffer, in place.
pub fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Crop `bbox` (clamped to the image) and resize the region to `size`×`size`.
pub fn crop_face(image: &RgbImage, bbox: &BoundingBox, size: u32) -> RgbImage {
    let b = bbox.clamp_to(image.width(), image.height());
    let region = imageops::crop_imm(image, b.x as u32, b.y as u32, b.width, b.height).to_image();
    imageops::resize(&region, size, size, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    #[test]
    fn test_normalize_grayscale_to_rgb() {
        let gray = GrayImage::from_pixel(4, 3, Luma([77]));
        let rgb = normalize(&DynamicImage::ImageLuma8(gray)).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(2, 1), &Rgb([77, 77, 77]));
    }

    #[test]
    fn test_normalize_rejects_empty() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        assert!(matches!(normalize(&empty), Err(ImageFormatError::Empty { .. })));
    }

    #[test]
    fn test_rgb_from_bgr_swaps_channels() {
        let bgr = vec![10, 20, 30, 40, 50, 60];
        let rgb = rgb_from_raw(&bgr, 2, 1, 3, ChannelOrder::Bgr).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([30, 20, 10]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([60, 50, 40]));
    }

    #[test]
    fn test_rgb_from_raw_drops_alpha() {
        let rgba = vec![1, 2, 3, 255];
        let rgb = rgb_from_raw(&rgba, 1, 1, 4, ChannelOrder::Rgb).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_rgb_from_raw_short_buffer() {
        let result = rgb_from_raw(&[0u8; 5], 2, 1, 3, ChannelOrder::Rgb);
        assert!(matches!(
            result,
            Err(ImageFormatError::BufferLength { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn test_rgb_from_raw_bad_channels() {
        let result = rgb_from_raw(&[0u8; 4], 2, 1, 2, ChannelOrder::Rgb);
        assert!(matches!(result, Err(ImageFormatError::UnsupportedChannels(2))));
    }

    #[test]
    fn test_pixel_frame_bgr_roundtrip_layout() {
        let mut rgb = RgbImage::new(1, 1);
        rgb.put_pixel(0, 0, Rgb([1, 2, 3]));
        let frame = PixelFrame::from_rgb(&rgb, ChannelOrder::Bgr);
        assert_eq!(frame.data, vec![3, 2, 1]);
        assert_eq!(frame.to_rgb().unwrap().get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_crop_face_output_size() {
        let image = RgbImage::from_pixel(320, 240, Rgb([128, 64, 32]));
        let bbox = BoundingBox { x: -10, y: 200, width: 80, height: 100 };
        let face = crop_face(&image, &bbox, 160);
        assert_eq!(face.dimensions(), (160, 160));
        assert_eq!(face.get_pixel(80, 80), &Rgb([128, 64, 32]));
    }
}
