//! Image processing on top of the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Decode** | `ImageReader` with content sniffing, preview bounded by `max_edge` |
//! | **Scale** | Lanczos3 `resize` / `resize_exact` / `resize_to_fill` |
//! | **Encode** | `image` codecs (JPEG, PNG, WebP, AVIF via rav1e, QOI, BMP, TIFF) |
//! | **EXIF carry-over** | custom JPEG APP1 splice |
//!
//! The module is split into:
//! - **Calculations**: pure dimension and placement math (unit testable)
//! - **Parameters**: data structures describing what to produce
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Compressor**: [`Compressor`] trait + [`ImageCompressor`]
//! - **Exif**: metadata transplant used by the file saver

pub mod backend;
pub mod calculations;
pub mod compressor;
pub mod exif;
pub mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use compressor::{Compressor, ImageCompressor};
pub use params::{
    ImageFormat, ImageInfo, Orientation, OutputSettings, Position, Quality, ResizeMode,
    StitchScale,
};
pub use rust_backend::RustBackend;
