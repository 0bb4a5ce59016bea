//! Parameter types for image operations.
//!
//! These structs describe *what* to produce, not *how*. They are the
//! interface between the screens (which decide what to render) and the
//! backend/compressor (which do the pixel and byte work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ImageFormat`]: Output container/codec, with its file extension.
//! - [`ResizeMode`]: How a target width/height is honoured.
//! - [`ImageInfo`]: Everything the compressor needs for one encode.
//! - [`OutputSettings`]: Per-screen output choices shared by every item.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0.clamp(1, 100)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Output formats the compressor can write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
    Avif,
    Qoi,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 7] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Webp,
        ImageFormat::Avif,
        ImageFormat::Qoi,
        ImageFormat::Bmp,
        ImageFormat::Tiff,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Qoi => "qoi",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Map a file extension (case-insensitive) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::Webp),
            "avif" => Some(ImageFormat::Avif),
            "qoi" => Some(ImageFormat::Qoi),
            "bmp" => Some(ImageFormat::Bmp),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    /// Whether [`Quality`] affects the encoded output.
    pub fn is_lossy(self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Avif)
    }

    /// Whether the format keeps an alpha channel.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, ImageFormat::Jpeg)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unknown image format: {s}"))
    }
}

/// How a requested size is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Stretch to exactly `width × height`.
    Exact,
    /// Fit inside `width × height`, preserving aspect ratio.
    #[default]
    Fit,
    /// Cover `width × height`, then center-crop.
    Fill,
}

/// Where an overlay is anchored on its base image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

/// Direction images are laid out in when stitched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

/// Which input defines the shared edge when stitching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StitchScale {
    /// Scale everything down to the smallest input's edge.
    #[default]
    Smallest,
    /// Scale everything up to the largest input's edge.
    Largest,
}

/// Everything the compressor needs for one encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub quality: Quality,
    pub width: u32,
    pub height: u32,
}

/// Output choices shared by every item a screen saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub format: ImageFormat,
    pub quality: Quality,
    /// Copy EXIF from the source into the output where both formats allow it.
    pub keep_metadata: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: ImageFormat::default(),
            quality: Quality::default(),
            keep_metadata: false,
        }
    }
}

impl OutputSettings {
    pub fn info_for(&self, width: u32, height: u32) -> ImageInfo {
        ImageInfo {
            format: self.format,
            quality: self.quality,
            width,
            height,
        }
    }
}
