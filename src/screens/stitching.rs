//! Image stitching: many inputs, one output.
//!
//! Unlike the per-item screens, a stitch needs every input decoded at once.
//! Decoding still goes through [`run_batch`] so progress is per input and
//! an undecodable input is skipped (and logged) instead of sinking the
//! whole stitch. The result is a one-entry [`BatchReport`] holding the saved
//! location.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use image::DynamicImage;

use crate::batch::run_batch;
use crate::config::ToolboxConfig;
use crate::holder::{Activity, BatchSlot, HasActivity, InvalidParams, Services, dedup_inputs};
use crate::imaging::OutputSettings;
use crate::saving::SaveTarget;
use crate::state::{Debouncer, Store};
use crate::stitch::{StitchError, StitchParams, stitch};
use crate::task::CancelToken;
use crate::types::{BatchReport, InputRef, ItemError, ItemResult};

const NAME: &str = "stitching";

#[derive(Debug, Clone)]
pub struct StitchState {
    /// In stitch order.
    pub inputs: Vec<InputRef>,
    pub params: StitchParams,
    pub output: OutputSettings,
    pub preview: Option<Arc<DynamicImage>>,
    pub is_loading_preview: bool,
    pub activity: Activity,
    pub last_report: Option<BatchReport>,
}

impl HasActivity for StitchState {
    fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }
}

pub struct StitchingScreen {
    services: Services,
    store: Store<StitchState>,
    slot: BatchSlot,
    debouncer: Debouncer,
    preview_generation: Arc<AtomicU64>,
}

/// Decode `inputs` (full or preview resolution), keeping the ones that
/// decode.
fn decode_all(
    inputs: &[InputRef],
    services: &Services,
    full_resolution: bool,
    token: &CancelToken,
    progress: impl FnMut(crate::types::BatchProgress),
) -> Result<Vec<DynamicImage>, crate::types::Cancelled> {
    let results = run_batch(
        inputs,
        token,
        |input, _| {
            services
                .backend
                .decode(input, full_resolution)
                .map_err(|e| ItemError::Decode(e.to_string()))
        },
        progress,
    )?;
    Ok(results
        .into_iter()
        .filter_map(|r| match r {
            ItemResult::Success(image) => Some(image),
            ItemResult::Failure(_) => None,
        })
        .collect())
}

fn stitch_and_save(
    images: &[DynamicImage],
    first: &InputRef,
    params: &StitchParams,
    output: &OutputSettings,
    location: Option<PathBuf>,
    services: &Services,
    token: &CancelToken,
) -> Result<PathBuf, ItemError> {
    let stitched = stitch(images, params, &*services.backend).map_err(|e| match e {
        StitchError::Empty => ItemError::Transform("no input could be decoded".into()),
        too_large => ItemError::Transform(too_large.to_string()),
    })?;
    token.check()?;
    let info = output.info_for(stitched.width(), stitched.height());
    let bytes = services
        .compressor
        .compress(&stitched, &info)
        .map_err(|e| ItemError::Transform(e.to_string()))?;
    token.check()?;
    let target = SaveTarget::new(first.clone(), 1, info).with_location(location);
    Ok(services.saver.save(&bytes, &target, output.keep_metadata)?)
}

impl StitchingScreen {
    pub fn new(services: Services, config: &ToolboxConfig) -> Self {
        let state = StitchState {
            inputs: Vec::new(),
            params: StitchParams::default(),
            output: config.output,
            preview: None,
            is_loading_preview: false,
            activity: Activity::IDLE,
            last_report: None,
        };
        Self {
            services,
            store: Store::new(state),
            slot: BatchSlot::new(NAME),
            debouncer: Debouncer::new(Duration::from_millis(config.preview.debounce_ms)),
            preview_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> StitchState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<StitchState> {
        self.store.subscribe()
    }

    pub fn set_inputs(&self, inputs: impl IntoIterator<Item = InputRef>) {
        let unique = dedup_inputs(inputs);
        self.store.update(|s| {
            s.inputs = unique;
            s.last_report = None;
        });
        self.schedule_preview();
    }

    pub fn remove_input(&self, input: &InputRef) -> bool {
        let removed = self.store.update(|s| {
            let before = s.inputs.len();
            s.inputs.retain(|i| i != input);
            s.inputs.len() != before
        });
        if removed {
            self.schedule_preview();
        }
        removed
    }

    /// Move the input at `from` to position `to`.
    pub fn move_input(&self, from: usize, to: usize) -> bool {
        let moved = self.store.update(|s| {
            if from >= s.inputs.len() || to >= s.inputs.len() || from == to {
                return false;
            }
            let input = s.inputs.remove(from);
            s.inputs.insert(to, input);
            true
        });
        if moved {
            self.schedule_preview();
        }
        moved
    }

    pub fn set_params(&self, params: StitchParams) -> Result<(), InvalidParams> {
        if params.spacing > 10_000 {
            return Err(InvalidParams {
                screen: NAME,
                reason: format!("spacing {} is too large", params.spacing),
            });
        }
        let changed = self.store.update(|s| {
            if s.params == params {
                return false;
            }
            s.params = params;
            true
        });
        if changed {
            self.schedule_preview();
        }
        Ok(())
    }

    pub fn set_output(&self, output: OutputSettings) {
        self.store.update(|s| s.output = output);
    }

    fn schedule_preview(&self) {
        let generation = self.preview_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (inputs, params) = self.store.update(|s| {
            s.preview = None;
            s.is_loading_preview = !s.inputs.is_empty();
            (s.inputs.clone(), s.params)
        });
        if inputs.is_empty() {
            return;
        }

        let services = self.services.clone();
        let store = self.store.clone();
        let current = Arc::clone(&self.preview_generation);
        self.debouncer.call(move || {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let token = CancelToken::new();
            let preview = decode_all(&inputs, &services, false, &token, |_| {})
                .ok()
                .and_then(|images| stitch(&images, &params, &*services.backend).ok());
            store.update(|s| {
                if current.load(Ordering::SeqCst) == generation {
                    s.is_loading_preview = false;
                    s.preview = preview.map(Arc::new);
                }
            });
        });
    }

    /// Stitch and save. Returns `false` (and does nothing) without inputs.
    pub fn run_batch(
        &self,
        one_time_location: Option<PathBuf>,
        on_result: impl FnOnce(BatchReport) + Send + 'static,
    ) -> bool {
        let (inputs, params, output) =
            self.store.read(|s| (s.inputs.clone(), s.params, s.output));
        let Some(first) = inputs.first().cloned() else {
            return false;
        };
        tracing::info!(screen = NAME, count = inputs.len(), "stitching");

        let services = self.services.clone();
        let listener = Arc::clone(&self.services.listener);
        self.slot.launch(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let images = decode_all(&inputs, &services, true, token, progress)?;
                if images.len() < inputs.len() {
                    tracing::warn!(
                        skipped = inputs.len() - images.len(),
                        "some inputs could not be decoded and were left out"
                    );
                }
                let result = stitch_and_save(
                    &images,
                    &first,
                    &params,
                    &output,
                    one_time_location,
                    &services,
                    token,
                );
                if matches!(result, Err(ItemError::Interrupted)) {
                    return Err(crate::types::Cancelled);
                }
                Ok(BatchReport::new(vec![ItemResult::from(result)]))
            },
            |s, report| s.last_report = Some(report.clone()),
            move |report| {
                if report.summary.any_succeeded() {
                    listener.register_save(NAME, &report.summary);
                }
                on_result(report);
            },
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::Orientation;
    use crate::saving::SaveCounter;
    use crate::test_helpers::{RecordingSaver, inputs, test_config, test_services, wait_for};
    use std::sync::mpsc;

    fn fixture(backend: MockBackend) -> (StitchingScreen, Arc<RecordingSaver>, Arc<SaveCounter>) {
        let saver = Arc::new(RecordingSaver::new());
        let counter = Arc::new(SaveCounter::new());
        let screen = StitchingScreen::new(
            test_services(Arc::new(backend), saver.clone(), counter.clone()),
            &test_config(),
        );
        (screen, saver, counter)
    }

    fn run(screen: &StitchingScreen) -> BatchReport {
        let (tx, rx) = mpsc::channel();
        assert!(screen.run_batch(None, move |r| tx.send(r).unwrap()));
        rx.recv_timeout(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn stitches_all_inputs_into_one_save() {
        let (screen, saver, counter) = fixture(MockBackend::with_size(10, 10));
        screen.set_inputs(inputs(&["a.jpg", "b.jpg", "c.jpg"]));

        let report = run(&screen);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].is_success());

        let saved = saver.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!((saved[0].0.info.width, saved[0].0.info.height), (30, 10));
        screen.wait();
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn undecodable_inputs_are_left_out() {
        let (screen, saver, _) = fixture(MockBackend::with_size(10, 10).failing_on("b.jpg"));
        screen.set_inputs(inputs(&["a.jpg", "b.jpg"]));
        screen
            .set_params(StitchParams {
                orientation: Orientation::Vertical,
                ..StitchParams::default()
            })
            .unwrap();

        let report = run(&screen);
        assert!(report.results[0].is_success());
        let saved = saver.saved.lock().unwrap().clone();
        assert_eq!((saved[0].0.info.width, saved[0].0.info.height), (10, 10));
    }

    #[test]
    fn nothing_decodable_is_a_failure_without_registration() {
        let (screen, _, counter) = fixture(MockBackend::new().failing_on("a.jpg"));
        screen.set_inputs(inputs(&["a.jpg"]));

        let report = run(&screen);
        assert_eq!(report.summary.failed, 1);
        screen.wait();
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn empty_inputs_is_noop() {
        let (screen, _, _) = fixture(MockBackend::new());
        assert!(!screen.run_batch(None, |_| {}));
    }

    #[test]
    fn move_input_reorders() {
        let (screen, _, _) = fixture(MockBackend::new());
        screen.set_inputs(inputs(&["a.jpg", "b.jpg", "c.jpg"]));
        assert!(screen.move_input(2, 0));
        assert_eq!(screen.snapshot().inputs, inputs(&["c.jpg", "a.jpg", "b.jpg"]));
        assert!(!screen.move_input(5, 0));
    }

    #[test]
    fn preview_is_stitched_from_preview_decodes() {
        let (screen, _, _) = fixture(MockBackend::with_size(10, 10));
        let rx = screen.subscribe();
        screen.set_inputs(inputs(&["a.jpg", "b.jpg"]));
        let state = wait_for(&rx, |s| s.preview.is_some());
        assert_eq!(state.preview.unwrap().width(), 20);
    }

    #[test]
    fn oversized_stitch_fails_without_saving() {
        let (screen, saver, counter) = fixture(MockBackend::with_size(10_000, 10));
        screen.set_inputs(inputs(&["a.jpg", "b.jpg"]));

        let report = run(&screen);
        assert!(matches!(
            report.results[0].failure(),
            Some(ItemError::Transform(msg)) if msg.contains("limit")
        ));
        assert!(saver.saved.lock().unwrap().is_empty());
        screen.wait();
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn cancel_mid_decode_drops_the_stitch() {
        let (screen, saver, counter) = fixture(MockBackend::with_size(10, 10).slow(40));
        screen.set_inputs(inputs(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg", "f.jpg"]));
        let rx = screen.subscribe();
        let (tx, results) = mpsc::channel();
        assert!(screen.run_batch(None, move |r| tx.send(r).unwrap()));

        wait_for(&rx, |s| s.activity.progress.completed >= 1);
        assert!(screen.cancel());
        screen.wait();

        let state = screen.snapshot();
        assert_eq!(state.activity, Activity::IDLE);
        assert!(state.last_report.is_none());
        assert!(results.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(saver.saved.lock().unwrap().is_empty());
        assert_eq!(counter.count(), 0);
    }
}
