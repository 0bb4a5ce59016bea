//! Pure Rust decoding backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` |
//! | Decode (JPEG, PNG, TIFF, WebP, BMP, GIF, QOI) | `image::ImageReader` with content sniffing |
//! | Preview downscale | `DynamicImage::resize` with `Triangle` (fast) |
//! | Scale | `resize_exact` / `resize` / `resize_to_fill` with `Lanczos3` |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::fit_within_edge;
use super::params::ResizeMode;
use crate::types::InputRef;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
///
/// AVIF is encode-only: the `image` crate's `"avif"` feature ships the rav1e
/// encoder, not a decoder, so `.avif` inputs are not offered.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
    ("bmp", ImageFormat::Bmp),
    ("gif", ImageFormat::Gif),
    ("qoi", ImageFormat::Qoi),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether `path` has an extension we can decode.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| supported_input_extensions().contains(&e.as_str()))
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// Preview decodes are bounded to `preview_max_edge` on the longer edge.
pub struct RustBackend {
    preview_max_edge: u32,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_preview_edge(1600)
    }

    pub fn with_preview_edge(preview_max_edge: u32) -> Self {
        Self {
            preview_max_edge: preview_max_edge.max(1),
        }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk, sniffing content when the
/// extension lies.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, input: &InputRef, full_resolution: bool) -> Result<DynamicImage, BackendError> {
        let image = load_image(input.path())?;
        if full_resolution {
            return Ok(image);
        }
        let (w, h) = fit_within_edge((image.width(), image.height()), self.preview_max_edge);
        if (w, h) == (image.width(), image.height()) {
            Ok(image)
        } else {
            Ok(image.resize(w, h, FilterType::Triangle))
        }
    }

    fn scale(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
        mode: ResizeMode,
    ) -> DynamicImage {
        let (width, height) = (width.max(1), height.max(1));
        match mode {
            ResizeMode::Exact => image.resize_exact(width, height, FilterType::Lanczos3),
            ResizeMode::Fit => image.resize(width, height, FilterType::Lanczos3),
            ResizeMode::Fill => image.resize_to_fill(width, height, FilterType::Lanczos3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_jpeg, create_test_png};

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp", "gif", "qoi"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
        assert!(!exts.contains(&"avif"));
    }

    #[test]
    fn supported_input_is_case_insensitive() {
        assert!(is_supported_input(Path::new("/a/B.JPG")));
        assert!(!is_supported_input(Path::new("/a/notes.txt")));
        assert!(!is_supported_input(Path::new("/a/no-extension")));
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let dims = RustBackend::new().identify(&path).unwrap();
        assert_eq!(dims.width, 200);
        assert_eq!(dims.height, 150);
    }

    #[test]
    fn identify_nonexistent_file_errors() {
        let result = RustBackend::new().identify(Path::new("/nonexistent/image.jpg"));
        assert!(result.is_err());
    }

    #[test]
    fn decode_full_resolution_keeps_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("big.png");
        create_test_png(&path, 300, 120);

        let image = RustBackend::with_preview_edge(100)
            .decode(&InputRef::new(&path), true)
            .unwrap();
        assert_eq!((image.width(), image.height()), (300, 120));
    }

    #[test]
    fn decode_preview_is_bounded() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("big.png");
        create_test_png(&path, 300, 120);

        let image = RustBackend::with_preview_edge(100)
            .decode(&InputRef::new(&path), false)
            .unwrap();
        assert_eq!((image.width(), image.height()), (100, 40));
    }

    #[test]
    fn decode_sniffs_mislabelled_content() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("actually-png.jpg");
        create_test_png(&path, 10, 10);

        let image = RustBackend::new().decode(&InputRef::new(&path), true).unwrap();
        assert_eq!(image.width(), 10);
    }

    #[test]
    fn decode_garbage_is_processing_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let result = RustBackend::new().decode(&InputRef::new(&path), true);
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn scale_modes_produce_expected_sizes() {
        let backend = RustBackend::new();
        let image = DynamicImage::new_rgb8(400, 200);

        let exact = backend.scale(&image, 100, 100, ResizeMode::Exact);
        assert_eq!((exact.width(), exact.height()), (100, 100));

        let fit = backend.scale(&image, 100, 100, ResizeMode::Fit);
        assert_eq!((fit.width(), fit.height()), (100, 50));

        let fill = backend.scale(&image, 100, 100, ResizeMode::Fill);
        assert_eq!((fill.width(), fill.height()), (100, 100));
    }
}
