//! Format conversion with optional resizing.
//!
//! The output format and quality come from the screen's
//! [`OutputSettings`](crate::imaging::OutputSettings); the parameters here
//! only describe the geometry. With neither `width` nor `height` set the
//! image passes through untouched. With only one set, the other follows the
//! source aspect ratio.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::ToolboxConfig;
use crate::holder::{Pipeline, Services, StateHolder};
use crate::imaging::calculations::{MAX_EDGE, exceeds_max_edge};
use crate::imaging::{ImageBackend, ResizeMode};
use crate::types::ItemError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: ResizeMode,
}

impl ConversionParams {
    /// Target size for a `source`-sized image, `None` when no resize is
    /// requested.
    pub fn target_size(&self, source: (u32, u32)) -> Option<(u32, u32)> {
        let (w, h) = source;
        let scale = |value: u32, from: u32, to: u32| {
            ((value as f64 * to as f64 / from.max(1) as f64).round() as u32).max(1)
        };
        match (self.width, self.height) {
            (None, None) => None,
            (Some(tw), Some(th)) => Some((tw, th)),
            (Some(tw), None) => Some((tw, scale(h, w, tw))),
            (None, Some(th)) => Some((scale(w, h, th), th)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Conversion;

impl Pipeline for Conversion {
    type Params = ConversionParams;
    const NAME: &'static str = "conversion";

    fn validate(&self, params: &ConversionParams) -> Result<(), String> {
        if params.width == Some(0) || params.height == Some(0) {
            return Err("width and height must be positive".into());
        }
        let too_large = |edge: Option<u32>| edge.is_some_and(|e| e > MAX_EDGE);
        if too_large(params.width) || too_large(params.height) {
            return Err(format!("width and height must be at most {MAX_EDGE}"));
        }
        Ok(())
    }

    fn render(
        &self,
        image: DynamicImage,
        params: &ConversionParams,
        backend: &dyn ImageBackend,
    ) -> Result<DynamicImage, ItemError> {
        match params.target_size((image.width(), image.height())) {
            Some((w, h)) if exceeds_max_edge((w, h)) => Err(ItemError::Transform(format!(
                "resizing {}x{} to {w}x{h} exceeds the {MAX_EDGE}px limit",
                image.width(),
                image.height()
            ))),
            Some((w, h)) if (w, h) != (image.width(), image.height()) => {
                Ok(backend.scale(&image, w, h, params.mode))
            }
            _ => Ok(image),
        }
    }
}

pub type ConversionScreen = StateHolder<Conversion>;

pub fn screen(services: Services, config: &ToolboxConfig) -> ConversionScreen {
    StateHolder::new(Conversion, services, config)
}
