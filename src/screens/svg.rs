//! Raster to SVG tracing.
//!
//! Each input is decoded, optionally reduced so its longer edge fits
//! `max_edge`, and traced into vector paths by `vtracer`. The SVG text is
//! saved next to the other outputs as `{stem}.svg` (same prefix, suffix,
//! sequence and collision rules as image saves) or cached and shared.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::batch::run_batch;
use crate::holder::{Activity, BatchSlot, HasActivity, InvalidParams, Services, dedup_inputs};
use crate::imaging::calculations::{MAX_EDGE, fit_within_edge};
use crate::imaging::{ImageBackend, ImageInfo, OutputSettings, ResizeMode};
use crate::saving::{BatchNames, SaveTarget};
use crate::share::SHARE_DONE;
use crate::state::Store;
use crate::task::CancelToken;
use crate::types::{BatchProgress, BatchReport, InputRef, ItemError};

const NAME: &str = "svg";

/// Starting point for the tracer settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvgPreset {
    /// Black and white.
    Bw,
    /// Few flat colour layers.
    #[default]
    Poster,
    /// Many colour layers.
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvgParams {
    pub preset: SvgPreset,
    /// Patches smaller than this many pixels (per side) are dropped.
    pub filter_speckle: usize,
    /// Significant bits per colour channel, 1..=8.
    pub color_precision: i32,
    /// Colour distance between stacked layers.
    pub layer_difference: i32,
    /// Minimum angle, in degrees, that counts as a corner.
    pub corner_threshold: i32,
    /// Decimal places in path coordinates.
    pub path_precision: u32,
    /// Longer edge the input is reduced to before tracing. `None` traces at
    /// full size.
    pub max_edge: Option<u32>,
}

impl Default for SvgParams {
    fn default() -> Self {
        Self {
            preset: SvgPreset::default(),
            filter_speckle: 4,
            color_precision: 6,
            layer_difference: 16,
            corner_threshold: 60,
            path_precision: 2,
            max_edge: Some(1024),
        }
    }
}

impl SvgParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.filter_speckle > 128 {
            return Err(format!("filter_speckle must be at most 128, got {}", self.filter_speckle));
        }
        if !(1..=8).contains(&self.color_precision) {
            return Err(format!(
                "color_precision must be within 1..=8, got {}",
                self.color_precision
            ));
        }
        if !(0..=255).contains(&self.layer_difference) {
            return Err(format!(
                "layer_difference must be within 0..=255, got {}",
                self.layer_difference
            ));
        }
        if !(0..=180).contains(&self.corner_threshold) {
            return Err(format!(
                "corner_threshold must be within 0..=180, got {}",
                self.corner_threshold
            ));
        }
        if self.path_precision > 8 {
            return Err(format!("path_precision must be at most 8, got {}", self.path_precision));
        }
        match self.max_edge {
            Some(0) => Err("max_edge must be positive".into()),
            Some(edge) if edge > MAX_EDGE => {
                Err(format!("max_edge must be at most {MAX_EDGE}, got {edge}"))
            }
            _ => Ok(()),
        }
    }

    fn tracer_config(&self) -> vtracer::Config {
        let base = match self.preset {
            SvgPreset::Bw => vtracer::Config::from_preset(vtracer::Preset::Bw),
            SvgPreset::Poster => vtracer::Config::from_preset(vtracer::Preset::Poster),
            SvgPreset::Photo => vtracer::Config::from_preset(vtracer::Preset::Photo),
        };
        vtracer::Config {
            filter_speckle: self.filter_speckle,
            color_precision: self.color_precision,
            layer_difference: self.layer_difference,
            corner_threshold: self.corner_threshold,
            path_precision: Some(self.path_precision),
            ..base
        }
    }
}

/// SVG text for one input plus the size of the raster it was traced from.
#[derive(Debug, Clone, PartialEq)]
pub struct Traced {
    pub svg: String,
    pub width: u32,
    pub height: u32,
}

/// Trace `image` per `params`, scaling it through `backend` first when it
/// exceeds `max_edge`.
pub fn trace(
    image: &DynamicImage,
    params: &SvgParams,
    backend: &dyn ImageBackend,
) -> Result<Traced, ItemError> {
    let source = (image.width(), image.height());
    let (width, height) = match params.max_edge {
        Some(edge) => fit_within_edge(source, edge),
        None => source,
    };
    let rgba = if (width, height) == source {
        image.to_rgba8()
    } else {
        backend.scale(image, width, height, ResizeMode::Exact).to_rgba8()
    };
    let raster = vtracer::ColorImage {
        pixels: rgba.into_raw(),
        width: width as usize,
        height: height as usize,
    };
    let svg = vtracer::convert(raster, params.tracer_config()).map_err(ItemError::Transform)?;
    Ok(Traced {
        svg: svg.to_string(),
        width,
        height,
    })
}

#[derive(Debug, Clone)]
pub struct SvgState {
    pub inputs: Vec<InputRef>,
    pub params: SvgParams,
    pub activity: Activity,
    pub last_report: Option<BatchReport>,
}

impl HasActivity for SvgState {
    fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }
}

pub struct SvgScreen {
    services: Services,
    store: Store<SvgState>,
    slot: BatchSlot,
}

fn trace_input(
    input: &InputRef,
    params: &SvgParams,
    services: &Services,
    token: &CancelToken,
) -> Result<Traced, ItemError> {
    let image = services
        .backend
        .decode(input, true)
        .map_err(|e| ItemError::Decode(e.to_string()))?;
    token.check()?;
    let traced = trace(&image, params, &*services.backend)?;
    token.check()?;
    Ok(traced)
}

/// Size information for the saver. SVG bytes carry no encoder settings.
fn svg_info(traced: &Traced) -> ImageInfo {
    OutputSettings::default().info_for(traced.width, traced.height)
}

impl SvgScreen {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            store: Store::new(SvgState {
                inputs: Vec::new(),
                params: SvgParams::default(),
                activity: Activity::IDLE,
                last_report: None,
            }),
            slot: BatchSlot::new(NAME),
        }
    }

    pub fn snapshot(&self) -> SvgState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<SvgState> {
        self.store.subscribe()
    }

    pub fn set_inputs(&self, inputs: impl IntoIterator<Item = InputRef>) {
        let unique = dedup_inputs(inputs);
        self.store.update(|s| {
            s.inputs = unique;
            s.last_report = None;
        });
    }

    pub fn remove_input(&self, input: &InputRef) -> bool {
        self.store.update(|s| {
            let before = s.inputs.len();
            s.inputs.retain(|i| i != input);
            s.inputs.len() != before
        })
    }

    pub fn set_params(&self, params: SvgParams) -> Result<(), InvalidParams> {
        params.validate().map_err(|reason| InvalidParams {
            screen: NAME,
            reason,
        })?;
        self.store.update(|s| s.params = params);
        Ok(())
    }

    /// Trace and save every input. Returns `false` (and does nothing)
    /// without inputs.
    pub fn run_batch(
        &self,
        one_time_location: Option<PathBuf>,
        on_result: impl FnOnce(BatchReport) + Send + 'static,
    ) -> bool {
        let (inputs, params) = self.store.read(|s| (s.inputs.clone(), s.params));
        if inputs.is_empty() {
            return false;
        }
        tracing::info!(screen = NAME, count = inputs.len(), "tracing");

        let services = self.services.clone();
        let listener = Arc::clone(&self.services.listener);
        self.slot.launch(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let names = BatchNames::new();
                let results = run_batch(
                    &inputs,
                    token,
                    |input, seq| {
                        let traced = trace_input(input, &params, &services, token)?;
                        let target = SaveTarget::new(input.clone(), seq, svg_info(&traced))
                            .with_location(one_time_location.clone())
                            .with_extension("svg")
                            .in_batch(&names);
                        Ok(services.saver.save(traced.svg.as_bytes(), &target, false)?)
                    },
                    progress,
                )?;
                Ok(BatchReport::new(results))
            },
            |s, report| s.last_report = Some(report.clone()),
            move |report| {
                tracing::info!(screen = NAME, summary = %report.summary, "batch finished");
                if report.summary.any_succeeded() {
                    listener.register_save(NAME, &report.summary);
                }
                on_result(report);
            },
        );
        true
    }

    /// Trace every input into the share cache and publish the cached files.
    pub fn share(&self, on_complete: impl FnOnce(Vec<PathBuf>) + Send + 'static) -> bool {
        let (inputs, params) = self.store.read(|s| (s.inputs.clone(), s.params));
        if inputs.is_empty() {
            return false;
        }

        let services = self.services.clone();
        self.slot.launch(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let results = run_batch(
                    &inputs,
                    token,
                    |input, _| {
                        let traced = trace_input(input, &params, &services, token)?;
                        let name = format!("{}.svg", input.stem());
                        services
                            .share
                            .cache_image(traced.svg.as_bytes(), &name)
                            .ok_or_else(|| {
                                ItemError::Transform(format!("could not cache {name} for sharing"))
                            })
                    },
                    &mut *progress,
                )?;
                let report = BatchReport::new(results);
                let cached: Vec<PathBuf> = report.successes().cloned().collect();
                let total = cached.len();
                services.share.share_many(&cached, &mut |done| {
                    if done != SHARE_DONE {
                        progress(BatchProgress {
                            completed: (done.max(0) as usize).min(total),
                            total: Some(total),
                        });
                    }
                });
                token.check()?;
                Ok(report)
            },
            |s, report| s.last_report = Some(report.clone()),
            |report| on_complete(report.successes().cloned().collect()),
        );
        true
    }

    pub fn cancel(&self) -> bool {
        self.slot.cancel(&self.store)
    }

    pub fn wait(&self) {
        self.slot.wait();
    }
}
