//! Single-image filters applied by the edit screen.
//!
//! A [`Filter`] is a tagged value: the variant names the operation and the
//! payload (if any) is its strength. [`FilterKind`] is the bare
//! discriminator, used to build a filter from a kind and a number coming
//! from outside (CLI flags, config), and [`Filter::value`] reads the number
//! back.
//!
//! | Kind | Value | `image` call |
//! |---|---|---|
//! | `brightness` | -255..=255 | `brighten` |
//! | `contrast` | percent, may be negative | `adjust_contrast` |
//! | `hue-rotate` | degrees | `huerotate` |
//! | `blur` | sigma, 0 = off | `blur` |
//! | `sharpen` | sigma, 0 = off | `unsharpen` |
//! | `rotate` | 90 / 180 / 270 | `rotate90` … |
//! | `grayscale`, `invert`, `flip-horizontal`, `flip-vertical` | none | |
//!
//! Filters never mutate their input; [`Filter::apply`] returns a new image.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum Filter {
    Brightness(i32),
    Contrast(f32),
    HueRotate(i32),
    Blur(f32),
    Sharpen(f32),
    Rotate(u32),
    Grayscale,
    Invert,
    FlipHorizontal,
    FlipVertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    Brightness,
    Contrast,
    HueRotate,
    Blur,
    Sharpen,
    Rotate,
    Grayscale,
    Invert,
    FlipHorizontal,
    FlipVertical,
}

impl FilterKind {
    pub const ALL: [FilterKind; 10] = [
        FilterKind::Brightness,
        FilterKind::Contrast,
        FilterKind::HueRotate,
        FilterKind::Blur,
        FilterKind::Sharpen,
        FilterKind::Rotate,
        FilterKind::Grayscale,
        FilterKind::Invert,
        FilterKind::FlipHorizontal,
        FilterKind::FlipVertical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Brightness => "brightness",
            FilterKind::Contrast => "contrast",
            FilterKind::HueRotate => "hue-rotate",
            FilterKind::Blur => "blur",
            FilterKind::Sharpen => "sharpen",
            FilterKind::Rotate => "rotate",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Invert => "invert",
            FilterKind::FlipHorizontal => "flip-horizontal",
            FilterKind::FlipVertical => "flip-vertical",
        }
    }

    pub fn takes_value(self) -> bool {
        self.default_value().is_some()
    }

    /// Strength used when none is given.
    pub fn default_value(self) -> Option<f32> {
        match self {
            FilterKind::Brightness => Some(20.0),
            FilterKind::Contrast => Some(15.0),
            FilterKind::HueRotate => Some(90.0),
            FilterKind::Blur => Some(2.0),
            FilterKind::Sharpen => Some(1.0),
            FilterKind::Rotate => Some(90.0),
            _ => None,
        }
    }

    /// Build a filter of this kind. `value` is ignored by kinds without one.
    pub fn with_value(self, value: f32) -> Filter {
        match self {
            FilterKind::Brightness => Filter::Brightness(value.round() as i32),
            FilterKind::Contrast => Filter::Contrast(value),
            FilterKind::HueRotate => Filter::HueRotate(value.round() as i32),
            FilterKind::Blur => Filter::Blur(value),
            FilterKind::Sharpen => Filter::Sharpen(value),
            FilterKind::Rotate => Filter::Rotate(value.round().max(0.0) as u32),
            FilterKind::Grayscale => Filter::Grayscale,
            FilterKind::Invert => Filter::Invert,
            FilterKind::FlipHorizontal => Filter::FlipHorizontal,
            FilterKind::FlipVertical => Filter::FlipVertical,
        }
    }

    pub fn with_default(self) -> Filter {
        self.with_value(self.default_value().unwrap_or_default())
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Brightness(_) => FilterKind::Brightness,
            Filter::Contrast(_) => FilterKind::Contrast,
            Filter::HueRotate(_) => FilterKind::HueRotate,
            Filter::Blur(_) => FilterKind::Blur,
            Filter::Sharpen(_) => FilterKind::Sharpen,
            Filter::Rotate(_) => FilterKind::Rotate,
            Filter::Grayscale => FilterKind::Grayscale,
            Filter::Invert => FilterKind::Invert,
            Filter::FlipHorizontal => FilterKind::FlipHorizontal,
            Filter::FlipVertical => FilterKind::FlipVertical,
        }
    }

    pub fn value(&self) -> Option<f32> {
        match *self {
            Filter::Brightness(v) | Filter::HueRotate(v) => Some(v as f32),
            Filter::Contrast(v) | Filter::Blur(v) | Filter::Sharpen(v) => Some(v),
            Filter::Rotate(v) => Some(v as f32),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Filter::Brightness(v) if !(-255..=255).contains(&v) => {
                Err(format!("brightness must be within -255..=255, got {v}"))
            }
            Filter::Contrast(v) if !v.is_finite() => Err("contrast must be finite".into()),
            Filter::Blur(v) | Filter::Sharpen(v) if !is_usable_sigma(v) => Err(format!(
                "{} sigma must be 0 or a positive normal number, got {v}",
                self.kind()
            )),
            Filter::Rotate(v) if v % 90 != 0 => {
                Err(format!("rotation must be a multiple of 90, got {v}"))
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        match *self {
            Filter::Brightness(v) => image.brighten(v),
            Filter::Contrast(v) => image.adjust_contrast(v),
            Filter::HueRotate(v) => image.huerotate(v),
            Filter::Blur(sigma) if sigma >= f32::MIN_POSITIVE => image.blur(sigma),
            Filter::Sharpen(sigma) if sigma >= f32::MIN_POSITIVE => image.unsharpen(sigma, 1),
            Filter::Blur(_) | Filter::Sharpen(_) => image.clone(),
            Filter::Rotate(deg) => match deg % 360 {
                90 => image.rotate90(),
                180 => image.rotate180(),
                270 => image.rotate270(),
                _ => image.clone(),
            },
            Filter::Grayscale => match image {
                DynamicImage::ImageRgba8(_) | DynamicImage::ImageLumaA8(_) => {
                    DynamicImage::ImageLumaA8(image.to_luma_alpha8())
                }
                _ => image.grayscale(),
            },
            Filter::Invert => {
                let mut out = image.clone();
                out.invert();
                out
            }
            Filter::FlipHorizontal => image.fliph(),
            Filter::FlipVertical => image.flipv(),
        }
    }
}

/// `image` panics on zero, subnormal and non-finite sigmas; zero is kept as
/// "off" and applied as a no-op.
fn is_usable_sigma(v: f32) -> bool {
    v == 0.0 || (v.is_finite() && v >= f32::MIN_POSITIVE)
}

/// Run `filters` in order.
pub fn apply_all(image: &DynamicImage, filters: &[Filter]) -> DynamicImage {
    filters
        .iter()
        .fold(image.clone(), |acc, filter| filter.apply(&acc))
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown filter: {s}"))
    }
}

/// Parses `kind` or `kind=value`, e.g. `grayscale`, `blur=1.5`.
impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (s.trim(), None),
        };
        let kind: FilterKind = name.parse()?;
        let filter = match value {
            Some(_) if !kind.takes_value() => return Err(format!("{kind} takes no value")),
            Some(v) => kind.with_value(
                v.parse::<f32>()
                    .map_err(|_| format!("invalid value for {kind}: {v}"))?,
            ),
            None => kind.with_default(),
        };
        filter.validate()?;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn two_pixels() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([10, 20, 30, 255])
            } else {
                Rgba([200, 100, 50, 128])
            }
        }))
    }

    #[test]
    fn kind_and_value_roundtrip_through_with_value() {
        for kind in FilterKind::ALL {
            let filter = kind.with_default();
            assert_eq!(filter.kind(), kind);
            assert_eq!(filter.value(), kind.default_value());
        }
    }

    #[test]
    fn parse_kind_with_and_without_value() {
        assert_eq!("blur=1.5".parse::<Filter>(), Ok(Filter::Blur(1.5)));
        assert_eq!("grayscale".parse::<Filter>(), Ok(Filter::Grayscale));
        assert_eq!("brightness".parse::<Filter>(), Ok(Filter::Brightness(20)));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("sepia".parse::<Filter>().is_err());
        assert!("invert=3".parse::<Filter>().is_err());
        assert!("blur=abc".parse::<Filter>().is_err());
        assert!("rotate=45".parse::<Filter>().is_err());
        assert!("brightness=999".parse::<Filter>().is_err());
    }

    #[test]
    fn serde_uses_kind_tag() {
        let json = serde_json::to_string(&Filter::Contrast(12.5)).unwrap();
        assert_eq!(json, r#"{"kind":"contrast","value":12.5}"#);
        let back: Filter = serde_json::from_str(r#"{"kind":"invert"}"#).unwrap();
        assert_eq!(back, Filter::Invert);
    }

    #[test]
    fn invert_returns_new_image() {
        let src = two_pixels();
        let out = Filter::Invert.apply(&src);
        assert_eq!(out.to_rgba8().get_pixel(0, 0), &Rgba([245, 235, 225, 255]));
        assert_eq!(src.to_rgba8().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn grayscale_keeps_alpha() {
        let out = Filter::Grayscale.apply(&two_pixels()).to_rgba8();
        let p = out.get_pixel(1, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[3], 128);
    }

    #[test]
    fn rotate_and_flip_change_geometry() {
        let src = two_pixels();
        let rotated = Filter::Rotate(90).apply(&src);
        assert_eq!((rotated.width(), rotated.height()), (1, 2));

        let flipped = Filter::FlipHorizontal.apply(&src).to_rgba8();
        assert_eq!(flipped.get_pixel(0, 0), &Rgba([200, 100, 50, 128]));
    }

    #[test]
    fn zero_sigma_is_a_no_op() {
        let src = two_pixels();
        for filter in [Filter::Blur(0.0), Filter::Sharpen(0.0)] {
            assert!(filter.validate().is_ok());
            assert_eq!(filter.apply(&src).to_rgba8(), src.to_rgba8());
        }
    }

    #[test]
    fn subnormal_and_negative_sigmas_are_rejected() {
        for v in [1e-40, -1.0, f32::NAN, f32::INFINITY] {
            assert!(Filter::Blur(v).validate().is_err(), "blur {v}");
            assert!(Filter::Sharpen(v).validate().is_err(), "sharpen {v}");
        }
        assert!("sharpen=0.5".parse::<Filter>().is_ok());
    }

    #[test]
    fn apply_all_runs_in_order() {
        let src = two_pixels();
        let twice = apply_all(&src, &[Filter::Invert, Filter::Invert]);
        assert_eq!(twice.to_rgba8(), src.to_rgba8());
    }
}
