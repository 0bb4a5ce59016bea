//! Encoding a rendered image into output bytes.
//!
//! | Format | Encoder | Notes |
//! |---|---|---|
//! | JPEG | `JpegEncoder::new_with_quality` | alpha is dropped (RGB8) |
//! | AVIF | `AvifEncoder` (rav1e, speed 6) | quality honoured |
//! | PNG, WebP, QOI, BMP, TIFF | `DynamicImage::write_to` | lossless; quality ignored |
//!
//! WebP output is lossless because the `image` crate only ships a lossless
//! WebP encoder. QOI goes through the same `image` crate path.

use super::backend::BackendError;
use super::params::{ImageFormat, ImageInfo};
use image::DynamicImage;
use std::io::Cursor;

/// Turns an image into encoded bytes. Deterministic for identical input.
pub trait Compressor: Send + Sync {
    fn compress(&self, image: &DynamicImage, info: &ImageInfo) -> Result<Vec<u8>, BackendError>;
}

/// `image`-crate encoders for every [`ImageFormat`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCompressor;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

fn encode_failed(format: ImageFormat, err: impl std::fmt::Display) -> BackendError {
    BackendError::ProcessingFailed(format!("{} encode failed: {}", format, err))
}

impl Compressor for ImageCompressor {
    fn compress(&self, image: &DynamicImage, info: &ImageInfo) -> Result<Vec<u8>, BackendError> {
        let mut buffer = Cursor::new(Vec::new());
        let quality = info.quality.value() as u8;

        match info.format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
                rgb.write_with_encoder(encoder)
                    .map_err(|e| encode_failed(info.format, e))?;
            }
            ImageFormat::Avif => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                    &mut buffer,
                    AVIF_SPEED,
                    quality,
                );
                rgba.write_with_encoder(encoder)
                    .map_err(|e| encode_failed(info.format, e))?;
            }
            ImageFormat::Png => write_lossless(image, &mut buffer, image::ImageFormat::Png)?,
            ImageFormat::Webp => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                write_lossless(&rgba, &mut buffer, image::ImageFormat::WebP)?
            }
            ImageFormat::Qoi => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                write_lossless(&rgba, &mut buffer, image::ImageFormat::Qoi)?
            }
            ImageFormat::Bmp => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                write_lossless(&rgba, &mut buffer, image::ImageFormat::Bmp)?
            }
            ImageFormat::Tiff => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                write_lossless(&rgba, &mut buffer, image::ImageFormat::Tiff)?
            }
        }

        Ok(buffer.into_inner())
    }
}

fn write_lossless(
    image: &DynamicImage,
    buffer: &mut Cursor<Vec<u8>>,
    format: image::ImageFormat,
) -> Result<(), BackendError> {
    image
        .write_to(buffer, format)
        .map_err(|e| BackendError::ProcessingFailed(format!("{format:?} encode failed: {e}")))
}
