//! Shared types used by every screen.
//!
//! These are the values that flow between the batch processor, the state
//! holders, and the CLI driver: input handles, progress counters, per-item
//! outcomes, and the summary derived from a finished batch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::saving::SaveError;

/// Opaque handle to a source image.
///
/// Cheap to clone (the path is shared) and immutable once created. Equality
/// is by path, so the same file picked twice is the same input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputRef(Arc<PathBuf>);

impl InputRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::new(path.into()))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File stem used when naming derived outputs (`photo.jpg` → `photo`).
    pub fn stem(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }

    /// File name including extension, falling back to the full path.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for InputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&str> for InputRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<PathBuf> for InputRef {
    fn from(value: PathBuf) -> Self {
        Self::new(value)
    }
}

/// Progress of the running batch.
///
/// `total == None` means no batch is running (the idle state). While a
/// batch runs, `completed <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: Option<usize>,
}

impl BatchProgress {
    pub const IDLE: Self = Self {
        completed: 0,
        total: None,
    };

    pub fn started(total: usize) -> Self {
        Self {
            completed: 0,
            total: Some(total),
        }
    }

    pub fn is_running(&self) -> bool {
        self.total.is_some()
    }

    /// Total as a signed count, `-1` when idle.
    pub fn total_count(&self) -> i64 {
        self.total.map(|t| t as i64).unwrap_or(-1)
    }

    /// Fraction complete in `0.0..=1.0`; zero when idle or empty.
    pub fn fraction(&self) -> f32 {
        match self.total {
            Some(total) if total > 0 => self.completed as f32 / total as f32,
            _ => 0.0,
        }
    }
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Why a single item failed. Never aborts the batch it belongs to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("transform failed: {0}")]
    Transform(String),
    #[error("save failed: {0}")]
    Save(#[from] SaveError),
    #[error("processing panicked: {0}")]
    Panicked(String),
    /// The batch was cancelled while this item ran. Never reaches a report:
    /// the batch itself ends with [`Cancelled`].
    #[error("interrupted")]
    Interrupted,
}

impl From<Cancelled> for ItemError {
    fn from(_: Cancelled) -> Self {
        ItemError::Interrupted
    }
}

/// Signal that the enclosing task was cancelled. Not a user-visible error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("task cancelled")]
pub struct Cancelled;

/// Outcome of one item, aligned positionally with the batch input list.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemResult<T = PathBuf> {
    Success(T),
    Failure(ItemError),
}

impl<T> ItemResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemResult::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            ItemResult::Success(value) => Some(value),
            ItemResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemError> {
        match self {
            ItemResult::Success(_) => None,
            ItemResult::Failure(err) => Some(err),
        }
    }
}

impl<T> From<Result<T, ItemError>> for ItemResult<T> {
    fn from(result: Result<T, ItemError>) -> Self {
        match result {
            Ok(value) => ItemResult::Success(value),
            Err(err) => ItemResult::Failure(err),
        }
    }
}

/// Success/failure counts derived from a full result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results<T>(results: &[ItemResult<T>]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// True when at least one item succeeded.
    pub fn any_succeeded(&self) -> bool {
        self.succeeded > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

/// Results of a finished batch together with their summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T = PathBuf> {
    pub results: Vec<ItemResult<T>>,
    pub summary: BatchSummary,
}

impl<T> BatchReport<T> {
    pub fn new(results: Vec<ItemResult<T>>) -> Self {
        let summary = BatchSummary::from_results(&results);
        Self { results, summary }
    }

    /// Successful values in input order.
    pub fn successes(&self) -> impl Iterator<Item = &T> {
        self.results.iter().filter_map(ItemResult::success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_ref_stem_and_name() {
        let input = InputRef::new("/photos/001-dawn.jpg");
        assert_eq!(input.stem(), "001-dawn");
        assert_eq!(input.file_name(), "001-dawn.jpg");
    }

    #[test]
    fn input_ref_equality_is_by_path() {
        assert_eq!(InputRef::from("a.png"), InputRef::new("a.png"));
        assert_ne!(InputRef::from("a.png"), InputRef::from("b.png"));
    }

    #[test]
    fn progress_idle_defaults() {
        let p = BatchProgress::default();
        assert_eq!(p, BatchProgress::IDLE);
        assert_eq!(p.total_count(), -1);
        assert!(!p.is_running());
        assert_eq!(p.fraction(), 0.0);
    }

    #[test]
    fn progress_fraction_while_running() {
        let p = BatchProgress {
            completed: 1,
            total: Some(4),
        };
        assert_eq!(p.total_count(), 4);
        assert_eq!(p.fraction(), 0.25);
    }

    #[test]
    fn summary_counts_results() {
        let results: Vec<ItemResult> = vec![
            ItemResult::Success(PathBuf::from("a")),
            ItemResult::Failure(ItemError::Decode("b".into())),
            ItemResult::Success(PathBuf::from("c")),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.to_string(), "2 succeeded, 1 failed");
    }

    #[test]
    fn summary_of_empty_results() {
        let summary = BatchSummary::from_results::<PathBuf>(&[]);
        assert_eq!(summary.total(), 0);
        assert!(!summary.any_succeeded());
    }

    #[test]
    fn report_successes_keep_order() {
        let report = BatchReport::new(vec![
            ItemResult::Success(1),
            ItemResult::Failure(ItemError::Transform("x".into())),
            ItemResult::Success(3),
        ]);
        assert_eq!(report.successes().copied().collect::<Vec<_>>(), vec![1, 3]);
    }
}
