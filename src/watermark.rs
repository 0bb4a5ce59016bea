//! Watermark rendering.
//!
//! A watermark is either a stamp image loaded from disk or a solid colour
//! block. Its width is a fraction (`scale`) of the base image's shorter
//! edge, it is blended at `alpha`, and it is either anchored at one of nine
//! positions (with `offset` as the margin) or tiled across the whole image
//! (with `offset` as the gap between tiles).
//!
//! The applier never touches its input; it returns a new RGBA image, or
//! `None` when the watermark itself cannot be produced (missing stamp file).

use crate::imaging::Position;
use crate::imaging::calculations::{anchor_origin, tile_origins, watermark_size};
use crate::task::lock;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkKind {
    /// Stamp image read from `path`.
    Image { path: PathBuf },
    /// Solid RGBA block.
    Block { color: [u8; 4] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Anchored(Position),
    Tiled,
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Anchored(Position::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkParams {
    pub kind: WatermarkKind,
    pub placement: Placement,
    /// Watermark width as a fraction of the base's shorter edge.
    pub scale: f32,
    /// Opacity multiplier, 0.0 (invisible) to 1.0.
    pub alpha: f32,
    /// Margin from anchored edges, or gap between tiles.
    pub offset: (u32, u32),
}

impl Default for WatermarkParams {
    fn default() -> Self {
        Self {
            kind: WatermarkKind::Block {
                color: [255, 255, 255, 255],
            },
            placement: Placement::default(),
            scale: 0.2,
            alpha: 0.5,
            offset: (16, 16),
        }
    }
}

impl WatermarkParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(format!("watermark scale must be in (0, 1], got {}", self.scale));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(format!("watermark alpha must be in [0, 1], got {}", self.alpha));
        }
        Ok(())
    }
}

/// Block watermarks are this many times wider than tall.
const BLOCK_ASPECT: u32 = 4;

pub trait WatermarkApplier: Send + Sync {
    fn apply(&self, image: &DynamicImage, params: &WatermarkParams) -> Option<DynamicImage>;
}

/// Last decoded stamp, valid while the file's modification time is unchanged.
struct CachedStamp {
    path: PathBuf,
    modified: SystemTime,
    image: Arc<RgbaImage>,
}

/// Default applier. Keeps the last stamp image decoded so a batch loads it
/// once.
#[derive(Default)]
pub struct Stamper {
    stamp: Mutex<Option<CachedStamp>>,
}

impl Stamper {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&self, path: &Path) -> Option<Arc<RgbaImage>> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        let mut cached = lock(&self.stamp);
        if let Some(hit) = cached.as_ref()
            && hit.path.as_path() == path
            && Some(hit.modified) == modified
        {
            return Some(Arc::clone(&hit.image));
        }
        match image::open(path) {
            Ok(img) => {
                let img = Arc::new(img.to_rgba8());
                *cached = modified.map(|modified| CachedStamp {
                    path: path.to_path_buf(),
                    modified,
                    image: Arc::clone(&img),
                });
                Some(img)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "watermark stamp unreadable: {e}");
                None
            }
        }
    }

    /// The mark, sized for `base` and faded to `alpha`.
    fn mark(&self, base: (u32, u32), params: &WatermarkParams) -> Option<RgbaImage> {
        let mut mark = match &params.kind {
            WatermarkKind::Image { path } => {
                let stamp = self.stamp(path)?;
                let (w, h) = watermark_size(base, stamp.dimensions(), params.scale);
                imageops::resize(&*stamp, w, h, FilterType::Lanczos3)
            }
            WatermarkKind::Block { color } => {
                let (w, h) = watermark_size(base, (BLOCK_ASPECT, 1), params.scale);
                RgbaImage::from_pixel(w, h, Rgba(*color))
            }
        };
        let alpha = params.alpha.clamp(0.0, 1.0);
        for pixel in mark.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * alpha).round() as u8;
        }
        Some(mark)
    }
}

impl WatermarkApplier for Stamper {
    fn apply(&self, image: &DynamicImage, params: &WatermarkParams) -> Option<DynamicImage> {
        let mut base = image.to_rgba8();
        let mark = self.mark(base.dimensions(), params)?;

        let origins = match params.placement {
            Placement::Anchored(position) => vec![anchor_origin(
                base.dimensions(),
                mark.dimensions(),
                position,
                params.offset,
            )],
            Placement::Tiled => tile_origins(base.dimensions(), mark.dimensions(), params.offset),
        };
        for (x, y) in origins {
            imageops::overlay(&mut base, &mark, x, y);
        }
        Some(DynamicImage::ImageRgba8(base))
    }
}
