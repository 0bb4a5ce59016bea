//! Packing the selected files into one zip archive.
//!
//! Inputs are copied into the archive byte for byte (no decode), one entry
//! per input, named after the input's file name. Names that collide get
//! `-1`, `-2`, … before the extension so no entry shadows another. A file
//! that cannot be read is reported as failed and left out; the archive is
//! kept as long as at least one entry made it in.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use thiserror::Error;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::batch::run_batch;
use crate::config::ToolboxConfig;
use crate::holder::{Activity, BatchSlot, HasActivity, Services, dedup_inputs};
use crate::saving::{SaveError, free_path};
use crate::state::Store;
use crate::types::{BatchReport, InputRef, ItemError, ItemResult};

const NAME: &str = "zip";
pub const ARCHIVE_NAME: &str = "images.zip";

#[derive(Error, Debug)]
pub enum ZipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Outcome of one archive run. Each entry result carries the entry name
/// the input was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveReport {
    /// `None` when nothing was archived.
    pub archive: Option<PathBuf>,
    pub entries: BatchReport<String>,
}

#[derive(Debug, Clone)]
pub struct ZipState {
    pub inputs: Vec<InputRef>,
    pub activity: Activity,
    pub last_report: Option<ArchiveReport>,
}

impl HasActivity for ZipState {
    fn activity_mut(&mut self) -> &mut Activity {
        &mut self.activity
    }
}

/// `name`, or `name` with the first free `-N` suffix when already used.
fn unique_entry_name(name: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    if used.contains(&candidate) {
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (name, None),
        };
        candidate = (1..)
            .map(|n| match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            })
            .find(|c| !used.contains(c))
            .unwrap_or_default();
    }
    used.insert(candidate.clone());
    candidate
}

fn create_archive(dir: &Path) -> Result<(PathBuf, ZipWriter<File>), ZipError> {
    fs::create_dir_all(dir)?;
    let path = free_path(dir, ARCHIVE_NAME);
    let file = File::create(&path)?;
    Ok((path, ZipWriter::new(file)))
}

fn add_entry(
    writer: &mut ZipWriter<File>,
    name: &str,
    bytes: &[u8],
) -> Result<(), ZipError> {
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    writer.start_file(name, options)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), "could not remove archive: {e}");
    }
}

pub struct ZipScreen {
    services: Services,
    store: Store<ZipState>,
    slot: BatchSlot,
    directory: PathBuf,
}

impl ZipScreen {
    pub fn new(services: Services, config: &ToolboxConfig) -> Self {
        Self {
            services,
            store: Store::new(ZipState {
                inputs: Vec::new(),
                activity: Activity::IDLE,
                last_report: None,
            }),
            slot: BatchSlot::new(NAME),
            directory: config.saving.directory.clone(),
        }
    }

    pub fn snapshot(&self) -> ZipState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<ZipState> {
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

    /// Write the archive into `one_time_location` (or the configured save
    /// directory). Returns `false` and does nothing without inputs.
    pub fn run_batch(
        &self,
        one_time_location: Option<PathBuf>,
        on_result: impl FnOnce(ArchiveReport) + Send + 'static,
    ) -> bool {
        let inputs = self.store.read(|s| s.inputs.clone());
        if inputs.is_empty() {
            return false;
        }
        let dir = one_time_location.unwrap_or_else(|| self.directory.clone());
        tracing::info!(screen = NAME, count = inputs.len(), dir = %dir.display(), "archiving");

        let listener = Arc::clone(&self.services.listener);
        self.slot.launch_or_discard(
            &self.store,
            inputs.len(),
            move |token, progress| {
                let (path, mut writer) = match create_archive(&dir) {
                    Ok(created) => created,
                    Err(e) => {
                        let err = ItemError::Save(SaveError::Io {
                            path: dir.join(ARCHIVE_NAME),
                            message: e.to_string(),
                        });
                        let results = inputs.iter().map(|_| ItemResult::Failure(err.clone()));
                        return Ok(ArchiveReport {
                            archive: None,
                            entries: BatchReport::new(results.collect()),
                        });
                    }
                };

                let mut used = HashSet::new();
                let archive_path = path.clone();
                let outcome = run_batch(
                    &inputs,
                    token,
                    |input, _| {
                        let bytes = fs::read(input.path())
                            .map_err(|e| ItemError::Decode(format!("{input}: {e}")))?;
                        let name = unique_entry_name(&input.file_name(), &mut used);
                        add_entry(&mut writer, &name, &bytes).map_err(|e| {
                            ItemError::Save(SaveError::Io {
                                path: archive_path.clone(),
                                message: e.to_string(),
                            })
                        })?;
                        Ok(name)
                    },
                    progress,
                );
                let entries = match outcome {
                    Ok(results) => BatchReport::new(results),
                    Err(cancelled) => {
                        drop(writer);
                        discard(&path);
                        return Err(cancelled);
                    }
                };

                if !entries.summary.any_succeeded() {
                    drop(writer);
                    discard(&path);
                    return Ok(ArchiveReport {
                        archive: None,
                        entries,
                    });
                }
                if let Err(e) = writer.finish() {
                    discard(&path);
                    let err = ItemError::Save(SaveError::Io {
                        path: path.clone(),
                        message: e.to_string(),
                    });
                    let results = entries
                        .results
                        .into_iter()
                        .map(|r| match r {
                            ItemResult::Success(_) => ItemResult::Failure(err.clone()),
                            failed => failed,
                        })
                        .collect();
                    return Ok(ArchiveReport {
                        archive: None,
                        entries: BatchReport::new(results),
                    });
                }
                Ok(ArchiveReport {
                    archive: Some(path),
                    entries,
                })
            },
            |s, report| s.last_report = Some(report.clone()),
            move |report| {
                if report.archive.is_some() {
                    listener.register_save(NAME, &report.entries.summary);
                }
                on_result(report);
            },
            |report: ArchiveReport| {
                if let Some(path) = report.archive {
                    discard(&path);
                }
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
