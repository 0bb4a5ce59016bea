//! Persisting encoded images and announcing finished saves.
//!
//! [`FileSaver`] is the seam the screens write through; [`FsSaver`] is the
//! filesystem implementation driven by the `[saving]` config section.
//!
//! ## Output naming
//!
//! ```text
//! {filename_prefix}{input stem}{filename_suffix}[_{NNN}].{ext}
//! ```
//!
//! The `_NNN` part is the 1-based position of the item in its batch and is
//! only added when `add_sequence_number` is set. When `overwrite` is off and
//! the name is taken, `-1`, `-2`, … is appended to the stem until a free
//! name is found. Within one batch ([`BatchNames`]) two items never share a
//! path, even with `overwrite` on: `a/x.jpg` and `b/x.jpg` become `x.jpg`
//! and `x-1.jpg`.
//!
//! ## Save registration
//!
//! A [`SaveListener`] hears about a batch once it completes with at least one
//! success. It receives the screen name and the batch summary; what it does
//! with them (log, count, persist) is up to the implementation.

use crate::config::SavingConfig;
use crate::imaging::exif::transplant_exif;
use crate::imaging::{ImageFormat, ImageInfo};
use crate::types::{BatchSummary, InputRef};
use crate::task::lock;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("no save directory configured")]
    NoLocation,
    #[error("could not write {path}: {message}")]
    Io { path: PathBuf, message: String },
}

impl SaveError {
    fn io(path: &Path, err: std::io::Error) -> Self {
        SaveError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Where and under what name one encoded item is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTarget {
    /// Input the bytes were rendered from; supplies the stem and, for
    /// metadata carry-over, the source bytes.
    pub original: InputRef,
    /// 1-based position in the batch.
    pub sequence: usize,
    pub info: ImageInfo,
    /// Directory that overrides the configured one for this save only.
    pub one_time_location: Option<PathBuf>,
    /// Paths already taken by earlier items of the same batch.
    pub batch: Option<BatchNames>,
    /// File extension when the bytes are not in `info.format` (traced SVG).
    pub extension: Option<&'static str>,
}

/// Paths claimed by one batch, shared by all of its save targets.
#[derive(Debug, Clone, Default)]
pub struct BatchNames(Arc<Mutex<HashSet<PathBuf>>>);

impl PartialEq for BatchNames {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl BatchNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `file_name` under `dir`, or its first `-N` variant that this
    /// batch has not claimed yet. With `keep_existing`, files already on
    /// disk are skipped as well.
    fn claim(&self, dir: &Path, file_name: &str, keep_existing: bool) -> PathBuf {
        let mut claimed = lock(&self.0);
        let path = pick_path(dir, file_name, |p| {
            claimed.contains(p) || (keep_existing && p.exists())
        });
        claimed.insert(path.clone());
        path
    }
}

impl SaveTarget {
    pub fn new(original: InputRef, sequence: usize, info: ImageInfo) -> Self {
        Self {
            original,
            sequence,
            info,
            one_time_location: None,
            batch: None,
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: &'static str) -> Self {
        self.extension = Some(extension);
        self
    }

    pub fn extension(&self) -> &'static str {
        self.extension.unwrap_or(self.info.format.extension())
    }

    pub fn in_batch(mut self, names: &BatchNames) -> Self {
        self.batch = Some(names.clone());
        self
    }

    pub fn with_location(mut self, location: Option<PathBuf>) -> Self {
        self.one_time_location = location;
        self
    }
}

pub trait FileSaver: Send + Sync {
    /// Write `bytes` for `target`, returning the final location.
    fn save(
        &self,
        bytes: &[u8],
        target: &SaveTarget,
        keep_metadata: bool,
    ) -> Result<PathBuf, SaveError>;
}

/// Saves into a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsSaver {
    config: SavingConfig,
}

impl FsSaver {
    pub fn new(config: SavingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SavingConfig {
        &self.config
    }

    /// File name for `target` before collision handling.
    pub fn file_name(&self, target: &SaveTarget) -> String {
        let mut name = format!(
            "{}{}{}",
            self.config.filename_prefix,
            target.original.stem(),
            self.config.filename_suffix
        );
        if self.config.add_sequence_number {
            name.push_str(&format!("_{:0>3}", target.sequence));
        }
        format!("{}.{}", name, target.extension())
    }
}

/// First path under `dir` for `file_name` that does not exist yet.
pub(crate) fn free_path(dir: &Path, file_name: &str) -> PathBuf {
    pick_path(dir, file_name, |p| p.exists())
}

/// `file_name` under `dir`, or its first `-N` variant that is not `taken`.
fn pick_path(dir: &Path, file_name: &str, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let candidate = dir.join(file_name);
    if !taken(&candidate) {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}-{n}.{ext}")),
            None => dir.join(format!("{stem}-{n}")),
        })
        .find(|p| !taken(p))
        .unwrap_or(candidate)
}

impl FileSaver for FsSaver {
    fn save(
        &self,
        bytes: &[u8],
        target: &SaveTarget,
        keep_metadata: bool,
    ) -> Result<PathBuf, SaveError> {
        let dir = target
            .one_time_location
            .as_deref()
            .unwrap_or(&self.config.directory);
        if dir.as_os_str().is_empty() {
            return Err(SaveError::NoLocation);
        }
        fs::create_dir_all(dir).map_err(|e| SaveError::io(dir, e))?;

        let file_name = self.file_name(target);
        let path = match &target.batch {
            Some(names) => names.claim(dir, &file_name, !self.config.overwrite),
            None if self.config.overwrite => dir.join(&file_name),
            None => free_path(dir, &file_name),
        };

        let with_metadata;
        let data = if keep_metadata
            && target.extension.is_none()
            && target.info.format == ImageFormat::Jpeg
        {
            match fs::read(target.original.path()) {
                Ok(source) => {
                    with_metadata = transplant_exif(&source, bytes.to_vec());
                    with_metadata.as_slice()
                }
                Err(e) => {
                    tracing::warn!(input = %target.original, "metadata not copied: {e}");
                    bytes
                }
            }
        } else {
            bytes
        };

        fs::write(&path, data).map_err(|e| SaveError::io(&path, e))?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "saved");
        Ok(path)
    }
}

/// Hears about batches that saved at least one item.
pub trait SaveListener: Send + Sync {
    fn register_save(&self, screen: &str, summary: &BatchSummary);
}

/// Records each registration as a tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSaveListener;

impl SaveListener for LogSaveListener {
    fn register_save(&self, screen: &str, summary: &BatchSummary) {
        tracing::info!(screen, %summary, "save registered");
    }
}

/// Counts registrations. Useful for drivers that report totals at exit.
#[derive(Debug, Default)]
pub struct SaveCounter {
    count: AtomicUsize,
}

impl SaveCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl SaveListener for SaveCounter {
    fn register_save(&self, _screen: &str, _summary: &BatchSummary) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use tempfile::TempDir;

    fn config(dir: &Path) -> SavingConfig {
        SavingConfig {
            directory: dir.to_path_buf(),
            ..SavingConfig::default()
        }
    }

    fn target(name: &str, seq: usize, format: ImageFormat) -> SaveTarget {
        SaveTarget::new(
            InputRef::new(format!("/src/{name}")),
            seq,
            ImageInfo {
                format,
                quality: Quality::default(),
                width: 1,
                height: 1,
            },
        )
    }

    // =========================================================================
    // naming
    // =========================================================================

    #[test]
    fn file_name_plain() {
        let saver = FsSaver::new(config(Path::new("/out")));
        assert_eq!(
            saver.file_name(&target("dawn.jpg", 1, ImageFormat::Png)),
            "dawn.png"
        );
    }

    #[test]
    fn file_name_with_prefix_suffix_and_sequence() {
        let saver = FsSaver::new(SavingConfig {
            filename_prefix: "wm_".into(),
            filename_suffix: "-final".into(),
            add_sequence_number: true,
            ..config(Path::new("/out"))
        });
        assert_eq!(
            saver.file_name(&target("dawn.jpg", 7, ImageFormat::Webp)),
            "wm_dawn-final_007.webp"
        );
    }

    #[test]
    fn extension_override_names_the_file() {
        let saver = FsSaver::new(config(Path::new("/out")));
        let t = target("dawn.jpg", 1, ImageFormat::Png).with_extension("svg");
        assert_eq!(saver.file_name(&t), "dawn.svg");
    }

    #[test]
    fn free_path_appends_counter() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("a-1.jpg"), b"x").unwrap();
        assert_eq!(free_path(tmp.path(), "a.jpg"), tmp.path().join("a-2.jpg"));
        assert_eq!(free_path(tmp.path(), "b.jpg"), tmp.path().join("b.jpg"));
    }

    // =========================================================================
    // save
    // =========================================================================

    #[test]
    fn save_writes_bytes_and_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("nested/out");
        let saver = FsSaver::new(config(&out));

        let path = saver
            .save(b"data", &target("a.jpg", 1, ImageFormat::Png), false)
            .unwrap();
        assert_eq!(path, out.join("a.png"));
        assert_eq!(fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn save_avoids_collisions_without_overwrite() {
        let tmp = TempDir::new().unwrap();
        let saver = FsSaver::new(config(tmp.path()));
        let t = target("a.jpg", 1, ImageFormat::Png);

        let first = saver.save(b"1", &t, false).unwrap();
        let second = saver.save(b"2", &t, false).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read(first).unwrap(), b"1");
    }

    #[test]
    fn save_overwrites_when_configured() {
        let tmp = TempDir::new().unwrap();
        let saver = FsSaver::new(SavingConfig {
            overwrite: true,
            ..config(tmp.path())
        });
        let t = target("a.jpg", 1, ImageFormat::Png);

        let first = saver.save(b"1", &t, false).unwrap();
        let second = saver.save(b"2", &t, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(second).unwrap(), b"2");
    }

    #[test]
    fn same_stem_twice_in_one_batch_gets_two_files_even_when_overwriting() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("x.png"), b"old").unwrap();
        let saver = FsSaver::new(SavingConfig {
            overwrite: true,
            ..config(tmp.path())
        });
        let names = BatchNames::new();
        let a = SaveTarget::new(InputRef::new("/a/x.jpg"), 1, target("x.jpg", 1, ImageFormat::Png).info)
            .in_batch(&names);
        let b = SaveTarget::new(InputRef::new("/b/x.jpg"), 2, a.info).in_batch(&names);

        let first = saver.save(b"1", &a, false).unwrap();
        let second = saver.save(b"2", &b, false).unwrap();
        assert_eq!(first, tmp.path().join("x.png"));
        assert_eq!(second, tmp.path().join("x-1.png"));
        assert_eq!(fs::read(first).unwrap(), b"1");
        assert_eq!(fs::read(second).unwrap(), b"2");
    }

    #[test]
    fn batch_names_still_skip_existing_files_without_overwrite() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("x.png"), b"old").unwrap();
        let saver = FsSaver::new(config(tmp.path()));
        let names = BatchNames::new();
        let t = target("x.jpg", 1, ImageFormat::Png).in_batch(&names);

        assert_eq!(saver.save(b"1", &t, false).unwrap(), tmp.path().join("x-1.png"));
        assert_eq!(saver.save(b"2", &t, false).unwrap(), tmp.path().join("x-2.png"));
        assert_eq!(fs::read(tmp.path().join("x.png")).unwrap(), b"old");
    }

    #[test]
    fn one_time_location_wins() {
        let tmp = TempDir::new().unwrap();
        let saver = FsSaver::new(config(&tmp.path().join("default")));
        let elsewhere = tmp.path().join("elsewhere");

        let path = saver
            .save(
                b"x",
                &target("a.jpg", 1, ImageFormat::Png).with_location(Some(elsewhere.clone())),
                false,
            )
            .unwrap();
        assert!(path.starts_with(&elsewhere));
    }

    #[test]
    fn empty_directory_is_no_location() {
        let saver = FsSaver::new(config(Path::new("")));
        let result = saver.save(b"x", &target("a.jpg", 1, ImageFormat::Png), false);
        assert_eq!(result, Err(SaveError::NoLocation));
    }

    #[test]
    fn unwritable_location_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let saver = FsSaver::new(config(&blocker.join("sub")));

        let result = saver.save(b"x", &target("a.jpg", 1, ImageFormat::Png), false);
        assert!(matches!(result, Err(SaveError::Io { .. })));
    }

    // =========================================================================
    // listeners
    // =========================================================================

    #[test]
    fn save_counter_counts_registrations() {
        let counter = SaveCounter::new();
        let summary = BatchSummary {
            succeeded: 1,
            failed: 0,
        };
        counter.register_save("watermarking", &summary);
        counter.register_save("watermarking", &summary);
        assert_eq!(counter.count(), 2);
    }
}
