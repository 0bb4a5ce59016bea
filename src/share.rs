//! Handing rendered images to something outside the toolbox.
//!
//! Sharing happens in two steps: rendered bytes are first cached under a
//! scratch directory ([`ShareProvider::cache_image`]), then the cached files
//! are published together ([`ShareProvider::share_many`]). Progress during
//! publishing is reported as the number of files done so far, and a final
//! `-1` marks completion.
//!
//! [`DirectoryShareProvider`] publishes by copying into an outbox directory,
//! which is what a desktop "share" amounts to without a platform share sheet.

use crate::config::ShareConfig;
use std::fs;
use std::path::PathBuf;

/// Progress value signalling that a share finished.
pub const SHARE_DONE: i64 = -1;

pub trait ShareProvider: Send + Sync {
    /// Store `bytes` under `name` in the share cache.
    ///
    /// Returns `None` when the cache could not be written.
    fn cache_image(&self, bytes: &[u8], name: &str) -> Option<PathBuf>;

    /// Publish `locations`, calling `on_progress` after each file and with
    /// [`SHARE_DONE`] once at the end.
    fn share_many(&self, locations: &[PathBuf], on_progress: &mut dyn FnMut(i64));
}

#[derive(Debug, Clone)]
pub struct DirectoryShareProvider {
    cache_dir: PathBuf,
    outbox_dir: PathBuf,
}

impl DirectoryShareProvider {
    pub fn new(config: &ShareConfig) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            outbox_dir: config.outbox_dir.clone(),
        }
    }

    pub fn outbox_dir(&self) -> &PathBuf {
        &self.outbox_dir
    }
}

impl ShareProvider for DirectoryShareProvider {
    fn cache_image(&self, bytes: &[u8], name: &str) -> Option<PathBuf> {
        let path = self.cache_dir.join(name);
        let written = fs::create_dir_all(&self.cache_dir).and_then(|()| fs::write(&path, bytes));
        match written {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), "caching for share failed: {e}");
                None
            }
        }
    }

    fn share_many(&self, locations: &[PathBuf], on_progress: &mut dyn FnMut(i64)) {
        if let Err(e) = fs::create_dir_all(&self.outbox_dir) {
            tracing::warn!(dir = %self.outbox_dir.display(), "share outbox unavailable: {e}");
            on_progress(SHARE_DONE);
            return;
        }
        for (i, location) in locations.iter().enumerate() {
            let Some(name) = location.file_name() else {
                continue;
            };
            let dest = self.outbox_dir.join(name);
            if let Err(e) = fs::copy(location, &dest) {
                tracing::warn!(source = %location.display(), "share copy failed: {e}");
            }
            on_progress(i as i64 + 1);
        }
        tracing::info!(count = locations.len(), outbox = %self.outbox_dir.display(), "shared");
        on_progress(SHARE_DONE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider(tmp: &TempDir) -> DirectoryShareProvider {
        DirectoryShareProvider::new(&ShareConfig {
            cache_dir: tmp.path().join("cache"),
            outbox_dir: tmp.path().join("outbox"),
        })
    }

    #[test]
    fn cache_image_writes_under_cache_dir() {
        let tmp = TempDir::new().unwrap();
        let path = provider(&tmp).cache_image(b"abc", "a.png").unwrap();
        assert_eq!(path, tmp.path().join("cache/a.png"));
        assert_eq!(fs::read(path).unwrap(), b"abc");
    }

    #[test]
    fn share_many_copies_and_reports_progress_then_done() {
        let tmp = TempDir::new().unwrap();
        let share = provider(&tmp);
        let a = share.cache_image(b"a", "a.png").unwrap();
        let b = share.cache_image(b"b", "b.png").unwrap();

        let mut seen = Vec::new();
        share.share_many(&[a, b], &mut |p| seen.push(p));

        assert_eq!(seen, vec![1, 2, SHARE_DONE]);
        assert_eq!(fs::read(tmp.path().join("outbox/b.png")).unwrap(), b"b");
    }

    #[test]
    fn share_many_with_nothing_still_completes() {
        let tmp = TempDir::new().unwrap();
        let mut seen = Vec::new();
        provider(&tmp).share_many(&[], &mut |p| seen.push(p));
        assert_eq!(seen, vec![SHARE_DONE]);
    }
}
