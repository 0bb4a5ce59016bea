//! Filter chain editing.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::config::ToolboxConfig;
use crate::filters::{Filter, apply_all};
use crate::holder::{Pipeline, Services, StateHolder};
use crate::imaging::ImageBackend;
use crate::types::ItemError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditParams {
    /// Applied in order.
    pub filters: Vec<Filter>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SingleEdit;

impl Pipeline for SingleEdit {
    type Params = EditParams;
    const NAME: &'static str = "single-edit";

    fn validate(&self, params: &EditParams) -> Result<(), String> {
        params.filters.iter().try_for_each(Filter::validate)
    }

    fn render(
        &self,
        image: DynamicImage,
        params: &EditParams,
        _backend: &dyn ImageBackend,
    ) -> Result<DynamicImage, ItemError> {
        if params.filters.is_empty() {
            return Ok(image);
        }
        Ok(apply_all(&image, &params.filters))
    }
}

pub type SingleEditScreen = StateHolder<SingleEdit>;

pub fn screen(services: Services, config: &ToolboxConfig) -> SingleEditScreen {
    StateHolder::new(SingleEdit, services, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;

    #[test]
    fn filters_run_in_order() {
        let params = EditParams {
            filters: vec![Filter::Rotate(90), Filter::FlipVertical],
        };
        let out = SingleEdit
            .render(DynamicImage::new_rgb8(4, 2), &params, &MockBackend::new())
            .unwrap();
        assert_eq!((out.width(), out.height()), (2, 4));
    }

    #[test]
    fn invalid_filter_fails_validation() {
        let params = EditParams {
            filters: vec![Filter::Grayscale, Filter::Rotate(45)],
        };
        assert!(SingleEdit.validate(&params).is_err());
    }

    #[test]
    fn params_deserialize_from_toml() {
        let params: EditParams = toml::from_str(
            r#"
            [[filters]]
            kind = "blur"
            value = 1.5

            [[filters]]
            kind = "invert"
            "#,
        )
        .unwrap();
        assert_eq!(params.filters, vec![Filter::Blur(1.5), Filter::Invert]);
    }
}
