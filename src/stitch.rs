//! Joining several images into one strip.
//!
//! Inputs are scaled so they share one edge (height for a horizontal strip,
//! width for a vertical one), then copied onto a background-filled canvas in
//! input order with `spacing` pixels between them. The layout math lives in
//! [`stitch_layout`](crate::imaging::calculations::stitch_layout); this
//! module does the pixel work, scaling inputs in parallel on the rayon pool.

use crate::imaging::calculations::{MAX_EDGE, exceeds_max_edge, stitch_layout};
use crate::imaging::{ImageBackend, Orientation, ResizeMode, StitchScale};
use image::{DynamicImage, Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StitchError {
    #[error("nothing to stitch")]
    Empty,
    #[error("stitched image would be {width}x{height}, over the {MAX_EDGE}px limit")]
    TooLarge { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StitchParams {
    pub orientation: Orientation,
    /// Gap between neighbouring images, in pixels.
    pub spacing: u32,
    /// Canvas colour showing through gaps and transparent areas.
    pub background: [u8; 4],
    pub scale_mode: StitchScale,
}

impl Default for StitchParams {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            spacing: 0,
            background: [0, 0, 0, 0],
            scale_mode: StitchScale::default(),
        }
    }
}

/// Stitch `images` per `params`.
///
/// The canvas size is checked before anything is scaled or allocated.
pub fn stitch(
    images: &[DynamicImage],
    params: &StitchParams,
    backend: &dyn ImageBackend,
) -> Result<DynamicImage, StitchError> {
    if images.is_empty() {
        return Err(StitchError::Empty);
    }
    let sizes: Vec<_> = images.iter().map(|i| (i.width(), i.height())).collect();
    let layout = stitch_layout(&sizes, params.orientation, params.spacing, params.scale_mode);
    if exceeds_max_edge(layout.canvas) {
        let (width, height) = layout.canvas;
        return Err(StitchError::TooLarge { width, height });
    }

    let scaled: Vec<RgbaImage> = images
        .par_iter()
        .zip(layout.placements.par_iter())
        .map(|(image, &(_, _, w, h))| {
            if (image.width(), image.height()) == (w, h) {
                image.to_rgba8()
            } else {
                backend.scale(image, w, h, ResizeMode::Exact).to_rgba8()
            }
        })
        .collect();

    let (canvas_w, canvas_h) = layout.canvas;
    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba(params.background));
    for (part, &(x, y, _, _)) in scaled.iter().zip(&layout.placements) {
        imageops::overlay(&mut canvas, part, x as i64, y as i64);
    }
    Ok(DynamicImage::ImageRgba8(canvas))
}
