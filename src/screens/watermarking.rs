//! Watermarking: stamp every input with an image or colour block.

use std::sync::Arc;

use image::DynamicImage;

use crate::config::ToolboxConfig;
use crate::holder::{Pipeline, Services, StateHolder};
use crate::imaging::ImageBackend;
use crate::types::ItemError;
use crate::watermark::{Stamper, WatermarkApplier, WatermarkParams};

pub struct Watermarking {
    applier: Arc<dyn WatermarkApplier>,
}

impl Watermarking {
    pub fn new(applier: Arc<dyn WatermarkApplier>) -> Self {
        Self { applier }
    }
}

impl Default for Watermarking {
    fn default() -> Self {
        Self::new(Arc::new(Stamper::new()))
    }
}

impl Pipeline for Watermarking {
    type Params = WatermarkParams;
    const NAME: &'static str = "watermarking";

    fn validate(&self, params: &WatermarkParams) -> Result<(), String> {
        params.validate()
    }

    fn render(
        &self,
        image: DynamicImage,
        params: &WatermarkParams,
        _backend: &dyn ImageBackend,
    ) -> Result<DynamicImage, ItemError> {
        self.applier
            .apply(&image, params)
            .ok_or_else(|| ItemError::Transform("watermark could not be applied".into()))
    }
}

pub type WatermarkingScreen = StateHolder<Watermarking>;

pub fn screen(services: Services, config: &ToolboxConfig) -> WatermarkingScreen {
    StateHolder::new(Watermarking::default(), services, config)
}
