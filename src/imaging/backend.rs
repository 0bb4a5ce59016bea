//! Image decoding/scaling backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations every backend
//! must support: identify, decode, and scale. Screens only talk to this
//! trait, so tests can swap in the recording `MockBackend`.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, built on
//! the `image` crate.

use super::params::ResizeMode;
use crate::types::InputRef;
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image decoding backends.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions without a full decode where possible.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode an input. With `full_resolution == false` the backend may
    /// return a downscaled image suitable for previews.
    fn decode(&self, input: &InputRef, full_resolution: bool) -> Result<DynamicImage, BackendError>;

    /// Scale an image to the requested size.
    fn scale(&self, image: &DynamicImage, width: u32, height: u32, mode: ResizeMode)
    -> DynamicImage;
}
