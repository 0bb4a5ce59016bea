//! Shared test utilities for the image-toolbox test suite.
//!
//! Synthetic image writers (no binary fixtures), recording test doubles for
//! the saver and share collaborators, and a helper for waiting on a state
//! subscription.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let backend = Arc::new(MockBackend::new());
//! let saver = Arc::new(RecordingSaver::new());
//! let counter = Arc::new(SaveCounter::new());
//! let holder = StateHolder::new(pipeline, test_services(backend, saver, counter), &test_config());
//!
//! let rx = holder.subscribe();
//! holder.set_inputs(inputs(&["a.jpg", "b.jpg"]));
//! let state = wait_for(&rx, |s| s.preview.is_some());
//! ```

use image::ImageEncoder;
use image::{RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::ToolboxConfig;
use crate::holder::Services;
use crate::imaging::{ImageBackend, ImageCompressor};
use crate::saving::{FileSaver, SaveError, SaveListener, SaveTarget};
use crate::share::{SHARE_DONE, ShareProvider};
use crate::types::InputRef;

// =========================================================================
// Synthetic images
// =========================================================================

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create a small valid PNG file (RGBA) with the given dimensions.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
    })
    .save_with_format(path, image::ImageFormat::Png)
    .unwrap();
}

// =========================================================================
// Inputs and config
// =========================================================================

pub fn inputs(names: &[&str]) -> Vec<InputRef> {
    names.iter().map(|n| InputRef::from(*n)).collect()
}

/// Stock config with a short preview debounce.
pub fn test_config() -> ToolboxConfig {
    let mut config = ToolboxConfig::default();
    config.preview.debounce_ms = 25;
    config
}

pub fn test_services(
    backend: Arc<dyn ImageBackend>,
    saver: Arc<dyn FileSaver>,
    listener: Arc<dyn SaveListener>,
) -> Services {
    Services {
        backend,
        compressor: Arc::new(ImageCompressor),
        saver,
        share: Arc::new(MemoryShare::default()),
        listener,
    }
}

// =========================================================================
// Test doubles
// =========================================================================

/// Saver that records targets instead of writing files.
#[derive(Default)]
pub struct RecordingSaver {
    pub saved: Mutex<Vec<(SaveTarget, usize)>>,
}

impl RecordingSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence numbers of every saved target, in save order.
    pub fn saved_sequences(&self) -> Vec<usize> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.sequence)
            .collect()
    }
}

impl FileSaver for RecordingSaver {
    fn save(
        &self,
        bytes: &[u8],
        target: &SaveTarget,
        _keep_metadata: bool,
    ) -> Result<PathBuf, SaveError> {
        self.saved.lock().unwrap().push((target.clone(), bytes.len()));
        let dir = target
            .one_time_location
            .clone()
            .unwrap_or_else(|| PathBuf::from("/out"));
        Ok(dir.join(format!(
            "{}.{}",
            target.original.stem(),
            target.extension()
        )))
    }
}

/// Share provider that keeps everything in memory.
#[derive(Default)]
pub struct MemoryShare {
    pub cached: Mutex<Vec<(String, usize)>>,
    pub shared: Mutex<Vec<PathBuf>>,
}

impl ShareProvider for MemoryShare {
    fn cache_image(&self, bytes: &[u8], name: &str) -> Option<PathBuf> {
        self.cached
            .lock()
            .unwrap()
            .push((name.to_string(), bytes.len()));
        Some(PathBuf::from("/cache").join(name))
    }

    fn share_many(&self, locations: &[PathBuf], on_progress: &mut dyn FnMut(i64)) {
        for (i, location) in locations.iter().enumerate() {
            self.shared.lock().unwrap().push(location.clone());
            on_progress(i as i64 + 1);
        }
        on_progress(SHARE_DONE);
    }
}

// =========================================================================
// Waiting on state
// =========================================================================

/// Receive snapshots until one satisfies `pred`. Panics after 10 seconds.
pub fn wait_for<S>(rx: &Receiver<S>, mut pred: impl FnMut(&S) -> bool) -> S {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(state) if pred(&state) => return state,
            Ok(_) => continue,
            Err(e) => panic!("state never satisfied the condition: {e}"),
        }
    }
}
