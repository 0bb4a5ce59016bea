//! Per-screen state holders.
//!
//! A state holder owns one screen's observable [`ScreenState`] (inputs,
//! selection, parameters, preview, busy flags, progress, last report) and
//! turns commands into background work:
//!
//! | Command | Effect |
//! |---|---|
//! | `set_inputs` / `remove_input` / `select_*` | Mutate the input list or selection, schedule a preview |
//! | `set_params` | Replace the pipeline parameters, schedule a preview |
//! | `set_output` / `set_keep_metadata` | Replace output settings (no preview) |
//! | `run_batch` | Decode → render → compress → save every input on the task slot |
//! | `share` | Decode → render → compress → cache every input, then publish |
//! | `cache_current` | Render the selected input and cache it for sharing |
//! | `cancel` | Cancel the running task and reset busy/progress to idle |
//!
//! Everything a screen does in the background goes through one
//! [`BatchSlot`], so starting a batch cancels the one before it. Results of a
//! cancelled batch never reach the state or the caller.
//!
//! Screens that fit "one input in, one image out" implement [`Pipeline`] and
//! get a full [`StateHolder`] for free. Screens with a different shape
//! (stitching, archives, checksums) build on [`BatchSlot`] and
//! [`Activity`] directly.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use image::DynamicImage;
use thiserror::Error;

use crate::batch::run_batch;
use crate::config::ToolboxConfig;
use crate::imaging::{Compressor, ImageBackend, ImageCompressor, ImageFormat, ImageInfo};
use crate::imaging::{OutputSettings, RustBackend};
use crate::saving::{BatchNames, FileSaver, FsSaver, LogSaveListener, SaveListener, SaveTarget};
use crate::share::{DirectoryShareProvider, SHARE_DONE, ShareProvider};
use crate::state::{Debouncer, Store};
use crate::task::{CancelToken, TaskSlot};
use crate::types::{BatchProgress, BatchReport, Cancelled, InputRef, ItemError};

// ============================================================================
// Services
// ============================================================================

/// Collaborators every screen works through.
#[derive(Clone)]
pub struct Services {
    pub backend: Arc<dyn ImageBackend>,
    pub compressor: Arc<dyn Compressor>,
    pub saver: Arc<dyn FileSaver>,
    pub share: Arc<dyn ShareProvider>,
    pub listener: Arc<dyn SaveListener>,
}

impl Services {
    /// Production services configured from `config`.
    pub fn from_config(config: &ToolboxConfig) -> Self {
        Self {
            backend: Arc::new(RustBackend::with_preview_edge(config.preview.max_edge)),
            compressor: Arc::new(ImageCompressor),
            saver: Arc::new(FsSaver::new(config.saving.clone())),
            share: Arc::new(DirectoryShareProvider::new(&config.share)),
            listener: Arc::new(LogSaveListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn SaveListener>) -> Self {
        self.listener = listener;
        self
    }
}

// ============================================================================
// Activity + batch slot
// ============================================================================

/// Busy flag and progress counters shared by every screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    pub is_saving: bool,
    pub progress: BatchProgress,
}

impl Activity {
    pub const IDLE: Self = Self {
        is_saving: false,
        progress: BatchProgress::IDLE,
    };
}

/// Screen state that carries an [`Activity`].
pub trait HasActivity {
    fn activity_mut(&mut self) -> &mut Activity;
}

/// A [`TaskSlot`] that keeps a screen's [`Activity`] in step with the task
/// it runs.
pub struct BatchSlot {
    slot: TaskSlot,
    /// Id of the most recent launch. A worker only clears the busy flag if
    /// it is still the most recent one.
    run: Arc<AtomicU64>,
}

impl BatchSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            slot: TaskSlot::new(name),
            run: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start `work` in place of whatever is running.
    ///
    /// `work` gets the cancel token and a progress sink. When it returns
    /// `Ok` and the task was not cancelled meanwhile, `record` applies the
    /// value to the state (under the store lock, together with resetting
    /// progress to idle) and then `after` receives it outside the lock.
    pub fn launch<S, T, W, R, A>(&self, store: &Store<S>, total: usize, work: W, record: R, after: A)
    where
        S: HasActivity + Clone + Send + 'static,
        T: Send + 'static,
        W: FnOnce(&CancelToken, &mut dyn FnMut(BatchProgress)) -> Result<T, Cancelled>
            + Send
            + 'static,
        R: FnOnce(&mut S, &T) + Send + 'static,
        A: FnOnce(T) + Send + 'static,
    {
        self.launch_or_discard(store, total, work, record, after, drop);
    }

    /// Like [`launch`](Self::launch), but a value that `work` produced and
    /// that is then refused because the task was cancelled goes to
    /// `discard`. Work with side effects on disk undoes them there.
    pub fn launch_or_discard<S, T, W, R, A, D>(
        &self,
        store: &Store<S>,
        total: usize,
        work: W,
        record: R,
        after: A,
        discard: D,
    ) where
        S: HasActivity + Clone + Send + 'static,
        T: Send + 'static,
        W: FnOnce(&CancelToken, &mut dyn FnMut(BatchProgress)) -> Result<T, Cancelled>
            + Send
            + 'static,
        R: FnOnce(&mut S, &T) + Send + 'static,
        A: FnOnce(T) + Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        self.slot.cancel();
        let run = self.run.fetch_add(1, Ordering::SeqCst) + 1;
        store.update(|s| {
            *s.activity_mut() = Activity {
                is_saving: true,
                progress: BatchProgress::started(total),
            };
        });

        let worker_store = store.clone();
        let finish_store = store.clone();
        let current = Arc::clone(&self.run);
        self.slot.start(
            move |token| {
                let mut sink = |progress: BatchProgress| {
                    if token.is_cancelled() {
                        return;
                    }
                    worker_store.update(|s| {
                        if !token.is_cancelled() {
                            s.activity_mut().progress = progress;
                        }
                    });
                };
                let value = match work(token, &mut sink) {
                    Ok(value) => value,
                    Err(Cancelled) => {
                        tracing::debug!(run, "batch cancelled, results dropped");
                        return;
                    }
                };
                let delivered = worker_store.update(|s| {
                    if token.is_cancelled() {
                        return false;
                    }
                    record(s, &value);
                    s.activity_mut().progress = BatchProgress::IDLE;
                    true
                });
                if delivered {
                    after(value);
                } else {
                    tracing::debug!(run, "batch cancelled after finishing, result discarded");
                    discard(value);
                }
            },
            move || {
                finish_store.update(|s| {
                    if current.load(Ordering::SeqCst) == run {
                        s.activity_mut().is_saving = false;
                    }
                });
            },
        );
    }

    /// Cancel the running task and reset the activity to idle.
    ///
    /// No-op (returns `false`, state untouched) when nothing is running.
    pub fn cancel<S>(&self, store: &Store<S>) -> bool
    where
        S: HasActivity + Clone + Send + 'static,
    {
        if !self.slot.cancel() {
            return false;
        }
        self.run.fetch_add(1, Ordering::SeqCst);
        store.update(|s| *s.activity_mut() = Activity::IDLE);
        true
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// Block until the current task (and any cancelled ones) exit.
    pub fn wait(&self) {
        self.slot.wait();
    }
}

/// `inputs` in order with repeats removed.
pub(crate) fn dedup_inputs(inputs: impl IntoIterator<Item = InputRef>) -> Vec<InputRef> {
    let mut unique: Vec<InputRef> = Vec::new();
    for input in inputs {
        if !unique.contains(&input) {
            unique.push(input);
        }
    }
    unique
}

// ============================================================================
// Pipeline + per-item rendering
// ============================================================================

/// A screen's per-item transformation.
pub trait Pipeline: Send + Sync + 'static {
    type Params: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Screen name used in logs and save registrations.
    const NAME: &'static str;

    fn validate(&self, _params: &Self::Params) -> Result<(), String> {
        Ok(())
    }

    /// Produce the output image for one decoded input.
    fn render(
        &self,
        image: DynamicImage,
        params: &Self::Params,
        backend: &dyn ImageBackend,
    ) -> Result<DynamicImage, ItemError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {screen} parameters: {reason}")]
pub struct InvalidParams {
    pub screen: &'static str,
    pub reason: String,
}

/// Everything one background job needs, captured at launch.
struct ItemJob<P: Pipeline> {
    pipeline: Arc<P>,
    services: Services,
    params: P::Params,
    output: OutputSettings,
    names: BatchNames,
}

impl<P: Pipeline> ItemJob<P> {
    fn render(&self, input: &InputRef, token: &CancelToken) -> Result<DynamicImage, ItemError> {
        let image = self
            .services
            .backend
            .decode(input, true)
            .map_err(|e| ItemError::Decode(e.to_string()))?;
        token.check()?;
        let rendered = self
            .pipeline
            .render(image, &self.params, &*self.services.backend)?;
        token.check()?;
        Ok(rendered)
    }

    fn encode(
        &self,
        input: &InputRef,
        token: &CancelToken,
    ) -> Result<(Vec<u8>, ImageInfo), ItemError> {
        let image = self.render(input, token)?;
        let info = self.output.info_for(image.width(), image.height());
        let bytes = self
            .services
            .compressor
            .compress(&image, &info)
            .map_err(|e| ItemError::Transform(e.to_string()))?;
        token.check()?;
        Ok((bytes, info))
    }

    fn save(
        &self,
        input: &InputRef,
        sequence: usize,
        location: Option<&PathBuf>,
        token: &CancelToken,
    ) -> Result<PathBuf, ItemError> {
        let (bytes, info) = self.encode(input, token)?;
        let target = SaveTarget::new(input.clone(), sequence, info)
            .with_location(location.cloned())
            .in_batch(&self.names);
        Ok(self
            .services
            .saver
            .save(&bytes, &target, self.output.keep_metadata)?)
    }

    fn cache(&self, input: &InputRef, token: &CancelToken) -> Result<PathBuf, ItemError> {
        let (bytes, info) = self.encode(input, token)?;
        let name = format!("{}.{}", input.stem(), info.format.extension());
        self.services
            .share
            .cache_image(&bytes, &name)
            .ok_or_else(|| ItemError::Transform(format!("could not cache {name} for sharing")))
    }
}

// ============================================================================
// StateHolder
// ============================================================================

/// Observable state of a per-item screen.
#[derive(Debug, Clone)]
pub struct ScreenState<Params> {
    pub inputs: Vec<InputRef>,
    pub selected: Option<InputRef>,
    pub params: Params,
    pub output: OutputSettings,
    /// Rendered preview of `selected`, `None` while stale or unavailable.
    pub preview: Option<Arc<DynamicImage>>,
    pub is_loading_preview: bool,
    pub activity: Activity,
    pub last_report: Option<BatchReport>,
}

impl<Params> ScreenState<Params> {
    pub fn is_saving(&self) -> bool {
        self.activity.is_saving
    }

    pub fn progress(&self) -> BatchProgress {
        self.activity.progress
    }
}

impl<Params> HasActivity for ScreenState<Params> {
    fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }
}

/// State holder for screens that map each input to one output image.
pub struct StateHolder<P: Pipeline> {
    pipeline: Arc<P>,
    services: Services,
    store: Store<ScreenState<P::Params>>,
    slot: BatchSlot,
    debouncer: Debouncer,
    preview_generation: Arc<AtomicU64>,
}

impl<P: Pipeline> StateHolder<P> {
    pub fn new(pipeline: P, services: Services, config: &ToolboxConfig) -> Self {
        let state = ScreenState {
            inputs: Vec::new(),
            selected: None,
            params: P::Params::default(),
            output: config.output,
            preview: None,
            is_loading_preview: false,
            activity: Activity::IDLE,
            last_report: None,
        };
        Self {
            pipeline: Arc::new(pipeline),
            services,
            store: Store::new(state),
            slot: BatchSlot::new(P::NAME),
            debouncer: Debouncer::new(Duration::from_millis(config.preview.debounce_ms)),
            preview_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> ScreenState<P::Params> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> std::sync::mpsc::Receiver<ScreenState<P::Params>> {
        self.store.subscribe()
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    // ------------------------------------------------------------------------
    // Inputs and selection
    // ------------------------------------------------------------------------

    /// Replace the input list. Duplicates are dropped; the first input
    /// becomes the selection.
    pub fn set_inputs(&self, inputs: impl IntoIterator<Item = InputRef>) {
        let unique = dedup_inputs(inputs);
        self.store.update(|s| {
            s.selected = unique.first().cloned();
            s.inputs = unique;
            s.last_report = None;
        });
        self.schedule_preview();
    }

    /// Drop `input` from the list. When it was selected, its left neighbour
    /// (or the new first input) takes over.
    pub fn remove_input(&self, input: &InputRef) -> bool {
        let (removed, selection_changed) = self.store.update(|s| {
            let Some(index) = s.inputs.iter().position(|i| i == input) else {
                return (false, false);
            };
            let was_selected = s.selected.as_ref() == Some(input);
            if was_selected {
                let neighbour = if index == 0 { 1 } else { index - 1 };
                s.selected = s.inputs.get(neighbour).cloned();
            }
            s.inputs.remove(index);
            (true, was_selected)
        });
        if selection_changed {
            self.schedule_preview();
        }
        removed
    }

    /// Select `input` if it is in the list.
    pub fn select_input(&self, input: &InputRef) -> bool {
        let changed = self.store.update(|s| {
            if !s.inputs.contains(input) || s.selected.as_ref() == Some(input) {
                return false;
            }
            s.selected = Some(input.clone());
            true
        });
        if changed {
            self.schedule_preview();
        }
        changed
    }

    /// Select the input after the current one. Stops at the end of the list.
    pub fn select_next(&self) -> bool {
        self.select_relative(1)
    }

    /// Select the input before the current one. Stops at the start.
    pub fn select_previous(&self) -> bool {
        self.select_relative(-1)
    }

    fn select_relative(&self, step: isize) -> bool {
        let target = self.store.read(|s| {
            let index = s.inputs.iter().position(|i| Some(i) == s.selected.as_ref())?;
            let next = index.checked_add_signed(step)?;
            s.inputs.get(next).cloned()
        });
        match target {
            Some(input) => self.select_input(&input),
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Parameters and output
    // ------------------------------------------------------------------------

    pub fn set_params(&self, params: P::Params) -> Result<(), InvalidParams> {
        self.pipeline
            .validate(&params)
            .map_err(|reason| InvalidParams {
                screen: P::NAME,
                reason,
            })?;
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

    pub fn set_keep_metadata(&self, keep: bool) {
        self.store.update(|s| s.output.keep_metadata = keep);
    }

    /// The output format to show in a file name picker. Only meaningful
    /// with a single input.
    pub fn format_for_filename(&self) -> Option<ImageFormat> {
        self.store
            .read(|s| (s.inputs.len() == 1).then_some(s.output.format))
    }

    // ------------------------------------------------------------------------
    // Preview
    // ------------------------------------------------------------------------

    /// Invalidate the preview and render a fresh one after the debounce
    /// interval. Only the latest scheduled render lands.
    fn schedule_preview(&self) {
        let generation = self.preview_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let target = self.store.update(|s| {
            s.preview = None;
            s.is_loading_preview = s.selected.is_some();
            s.selected.clone().map(|input| (input, s.params.clone()))
        });
        let Some((input, params)) = target else {
            return;
        };

        let pipeline = Arc::clone(&self.pipeline);
        let backend = Arc::clone(&self.services.backend);
        let store = self.store.clone();
        let current = Arc::clone(&self.preview_generation);
        self.debouncer.call(move || {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let rendered = catch_unwind(AssertUnwindSafe(|| {
                let image = backend
                    .decode(&input, false)
                    .map_err(|e| ItemError::Decode(e.to_string()))?;
                pipeline.render(image, &params, &*backend)
            }))
            .unwrap_or_else(|_| Err(ItemError::Panicked("preview render".into())));

            store.update(|s| {
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                s.is_loading_preview = false;
                match rendered {
                    Ok(image) => s.preview = Some(Arc::new(image)),
                    Err(e) => {
                        tracing::warn!(screen = P::NAME, input = %input, "preview failed: {e}");
                        s.preview = None;
                    }
                }
            });
        });
    }

    // ------------------------------------------------------------------------
    // Background work
    // ------------------------------------------------------------------------

    fn item_job(&self, state: &ScreenState<P::Params>) -> ItemJob<P> {
        ItemJob {
            pipeline: Arc::clone(&self.pipeline),
            services: self.services.clone(),
            params: state.params.clone(),
            output: state.output,
            names: BatchNames::new(),
        }
    }

    /// Save every input. Returns `false` (and does nothing) without inputs.
    ///
    /// `on_result` gets the report once the batch completes; it is never
    /// called for a cancelled batch. The save listener is told once when
    /// at least one item was saved.
    pub fn run_batch(
        &self,
        one_time_location: Option<PathBuf>,
        on_result: impl FnOnce(BatchReport) + Send + 'static,
    ) -> bool {
        let (inputs, job) = self.store.read(|s| (s.inputs.clone(), self.item_job(s)));
        if inputs.is_empty() {
            return false;
        }
        tracing::info!(screen = P::NAME, count = inputs.len(), "saving batch");

        let listener = Arc::clone(&self.services.listener);
        self.slot.launch(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let results = run_batch(
                    &inputs,
                    token,
                    |input, seq| job.save(input, seq, one_time_location.as_ref(), token),
                    progress,
                )?;
                Ok(BatchReport::new(results))
            },
            |s, report| s.last_report = Some(report.clone()),
            move |report| {
                tracing::info!(screen = P::NAME, summary = %report.summary, "batch finished");
                if report.summary.any_succeeded() {
                    listener.register_save(P::NAME, &report.summary);
                }
                on_result(report);
            },
        );
        true
    }

    /// Render every input into the share cache and publish the cached
    /// files. `on_complete` receives the published locations.
    pub fn share(&self, on_complete: impl FnOnce(Vec<PathBuf>) + Send + 'static) -> bool {
        let (inputs, job) = self.store.read(|s| (s.inputs.clone(), self.item_job(s)));
        if inputs.is_empty() {
            return false;
        }

        let share = Arc::clone(&self.services.share);
        self.slot.launch(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let results = run_batch(
                    &inputs,
                    token,
                    |input, _| job.cache(input, token),
                    &mut *progress,
                )?;
                let report = BatchReport::new(results);
                let cached: Vec<PathBuf> = report.successes().cloned().collect();
                let total = cached.len();
                share.share_many(&cached, &mut |done| {
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

    /// Render the selected input at full resolution and cache it for
    /// sharing.
    pub fn cache_current(&self, on_complete: impl FnOnce(Option<PathBuf>) + Send + 'static) -> bool {
        let (selected, job) = self.store.read(|s| (s.selected.clone(), self.item_job(s)));
        let Some(input) = selected else {
            return false;
        };

        self.slot.launch(
            &self.store,
            1,
            move |token, progress| {
                let cached = match job.cache(&input, token) {
                    Ok(path) => Some(path),
                    Err(ItemError::Interrupted) => return Err(Cancelled),
                    Err(e) => {
                        tracing::warn!(input = %input, "caching failed: {e}");
                        None
                    }
                };
                progress(BatchProgress {
                    completed: 1,
                    total: Some(1),
                });
                Ok(cached)
            },
            |_, _| {},
            on_complete,
        );
        true
    }

    /// Cancel the running task. No-op when nothing runs.
    pub fn cancel(&self) -> bool {
        self.slot.cancel(&self.store)
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    /// Block until background work finishes.
    pub fn wait(&self) {
        self.slot.wait();
    }
}
