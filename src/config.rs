//! Toolbox configuration module.
//!
//! Handles loading, validating, and merging `toolbox.toml`. Stock defaults
//! are the base layer; a user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! format = "jpeg"           # jpeg, png, webp, avif, qoi, bmp, tiff
//! quality = 90              # Lossy encoding quality (1-100)
//! keep_metadata = false     # Copy EXIF from JPEG sources into JPEG outputs
//!
//! [saving]
//! directory = "toolbox-output"
//! filename_prefix = ""
//! filename_suffix = ""
//! add_sequence_number = false
//! overwrite = false
//!
//! [preview]
//! debounce_ms = 300         # Quiet period before a preview is rendered
//! max_edge = 1600           # Longest preview edge in pixels
//!
//! [share]
//! cache_dir = "toolbox-output/.share-cache"
//! outbox_dir = "toolbox-output/shared"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::imaging::OutputSettings;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE: &str = "toolbox.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Toolbox configuration loaded from `toolbox.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolboxConfig {
    /// Format, quality and metadata handling for saved images.
    pub output: OutputSettings,
    /// Where saved files go and how they are named.
    pub saving: SavingConfig,
    /// Live preview rendering.
    pub preview: PreviewConfig,
    /// Share cache and outbox.
    pub share: ShareConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ToolboxConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let quality = self.output.quality.0;
        if quality == 0 || quality > 100 {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.preview.max_edge == 0 {
            return Err(ConfigError::Validation(
                "preview.max_edge must be non-zero".into(),
            ));
        }
        if self.saving.directory.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "saving.directory must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Output location and naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SavingConfig {
    /// Directory saved files are written to. Created on first save.
    pub directory: PathBuf,
    /// Prepended to the input's file stem.
    pub filename_prefix: String,
    /// Appended to the input's file stem.
    pub filename_suffix: String,
    /// Append `_NNN`, the item's 1-based position in its batch.
    pub add_sequence_number: bool,
    /// Replace existing files instead of picking a free name.
    pub overwrite: bool,
}

impl Default for SavingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("toolbox-output"),
            filename_prefix: String::new(),
            filename_suffix: String::new(),
            add_sequence_number: false,
            overwrite: false,
        }
    }
}

/// Preview rendering settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// How long parameters must stay unchanged before a preview renders.
    pub debounce_ms: u64,
    /// Previews are decoded to fit within this edge.
    pub max_edge: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_edge: 1600,
        }
    }
}

/// Share cache and outbox locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShareConfig {
    /// Scratch directory rendered images are cached in before sharing.
    pub cache_dir: PathBuf,
    /// Directory shared files are published into.
    pub outbox_dir: PathBuf,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("toolbox-output/.share-cache"),
            outbox_dir: PathBuf::from("toolbox-output/shared"),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ToolboxConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ToolboxConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ToolboxConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `toolbox.toml` from the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<ToolboxConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILE))
}

/// Like [`load_config`], for an explicit file path.
pub fn load_config_file(path: &Path) -> Result<ToolboxConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    let config = resolve_config(base, overlay)?;
    tracing::debug!(path = %path.display(), "config resolved");
    Ok(config)
}

/// Returns a fully-commented stock `toolbox.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image Toolbox Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[output]
# One of: jpeg, png, webp, avif, qoi, bmp, tiff
format = "jpeg"

# Lossy encoding quality (1 = worst, 100 = best).
quality = 90

# Copy EXIF metadata from JPEG sources into JPEG outputs.
keep_metadata = false

# ---------------------------------------------------------------------------
# Saving
# ---------------------------------------------------------------------------
[saving]
# Directory saved files go to. Created on first save.
directory = "toolbox-output"

# Output name: {prefix}{input stem}{suffix}[_NNN].{ext}
filename_prefix = ""
filename_suffix = ""

# Append the item's 1-based position in its batch as _001, _002, ...
add_sequence_number = false

# Replace existing files. When off, -1, -2, ... is appended instead.
overwrite = false

# ---------------------------------------------------------------------------
# Preview
# ---------------------------------------------------------------------------
[preview]
# Parameters must stay unchanged this long before a preview renders.
debounce_ms = 300

# Previews are decoded to fit within this many pixels on the long edge.
max_edge = 1600

# ---------------------------------------------------------------------------
# Sharing
# ---------------------------------------------------------------------------
[share]
cache_dir = "toolbox-output/.share-cache"
outbox_dir = "toolbox-output/shared"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
