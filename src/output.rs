//! CLI output formatting for every screen.
//!
//! # Information-First Display
//!
//! Each input leads with its positional index and file name; what happened
//! to it (saved location, failure reason, digest) follows as context. The
//! positional index matches the batch order, so a line can be traced back
//! to the command line argument that produced it.
//!
//! # Output Format
//!
//! ## Progress
//!
//! ```text
//! watermarking 2/5
//! ```
//!
//! ## Per-item screens
//!
//! ```text
//! 001 dawn.jpg → toolbox-output/dawn.jpg
//! 002 broken.jpg
//!     Failed: decode failed: unexpected end of file
//! Saved 1 of 2 (1 failed)
//! ```
//!
//! ## Zip
//!
//! ```text
//! 001 dawn.jpg → dawn.jpg
//! 002 dawn.jpg → dawn-1.jpg
//! Archive: toolbox-output/images.zip
//! ```
//!
//! ## Checksum
//!
//! ```text
//! 001 dawn.jpg
//!     sha256: ba7816bf…
//!     Matches expected
//! ```
//!
//! # Architecture
//!
//! Each screen has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects. The `*_json` functions build
//! the machine-readable report written by `--report`.

use serde_json::{Value, json};
use std::path::PathBuf;

use crate::screens::{ArchiveReport, ChecksumMatch, HashAlgorithm};
use crate::types::{BatchProgress, BatchReport, BatchSummary, InputRef, ItemResult};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Header line for one input.
fn input_line(index: usize, input: &InputRef) -> String {
    format!("{} {}", format_index(index), input.file_name())
}

/// One or two lines for an item: the header, then either `→ detail` on the
/// same line or an indented failure line.
fn item_lines<T>(
    index: usize,
    input: &InputRef,
    result: &ItemResult<T>,
    detail: impl Fn(&T) -> String,
) -> Vec<String> {
    match result {
        ItemResult::Success(value) => {
            vec![format!("{} \u{2192} {}", input_line(index, input), detail(value))]
        }
        ItemResult::Failure(err) => vec![
            input_line(index, input),
            format!("{}Failed: {}", indent(1), err),
        ],
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress line, `None` when idle.
pub fn format_progress(screen: &str, progress: &BatchProgress) -> Option<String> {
    progress
        .total
        .map(|total| format!("{} {}/{}", screen, progress.completed, total))
}

/// Summary line for a finished save batch.
pub fn format_summary(summary: &BatchSummary) -> String {
    match summary.failed {
        0 => format!("Saved {} of {}", summary.succeeded, summary.total()),
        failed => format!(
            "Saved {} of {} ({} failed)",
            summary.succeeded,
            summary.total(),
            failed
        ),
    }
}

// ============================================================================
// Per-item screens
// ============================================================================

/// Lines for a save batch: one entry per input, then the summary.
pub fn format_save_report(inputs: &[InputRef], report: &BatchReport) -> Vec<String> {
    let mut lines: Vec<String> = inputs
        .iter()
        .zip(&report.results)
        .enumerate()
        .flat_map(|(i, (input, result))| {
            item_lines(i + 1, input, result, |path| path.display().to_string())
        })
        .collect();
    lines.push(format_summary(&report.summary));
    lines
}

pub fn print_save_report(inputs: &[InputRef], report: &BatchReport) {
    for line in format_save_report(inputs, report) {
        println!("{}", line);
    }
}

/// Lines for a stitch: the saved location or the reason nothing was saved.
pub fn format_stitch_report(inputs: &[InputRef], report: &BatchReport) -> Vec<String> {
    let mut lines = vec![format!("Stitched {} inputs", inputs.len())];
    for result in &report.results {
        match result {
            ItemResult::Success(path) => {
                lines.push(format!("{}\u{2192} {}", indent(1), path.display()))
            }
            ItemResult::Failure(err) => lines.push(format!("{}Failed: {}", indent(1), err)),
        }
    }
    lines
}

pub fn print_stitch_report(inputs: &[InputRef], report: &BatchReport) {
    for line in format_stitch_report(inputs, report) {
        println!("{}", line);
    }
}

/// Lines for shared files, one per cached location.
pub fn format_shared(locations: &[PathBuf]) -> Vec<String> {
    let mut lines: Vec<String> = locations
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} {}", format_index(i + 1), p.display()))
        .collect();
    lines.push(format!("Shared {} files", locations.len()));
    lines
}

// ============================================================================
// Zip
// ============================================================================

pub fn format_archive_report(inputs: &[InputRef], report: &ArchiveReport) -> Vec<String> {
    let mut lines: Vec<String> = inputs
        .iter()
        .zip(&report.entries.results)
        .enumerate()
        .flat_map(|(i, (input, result))| item_lines(i + 1, input, result, |name| name.clone()))
        .collect();
    match &report.archive {
        Some(path) => lines.push(format!("Archive: {}", path.display())),
        None => lines.push("No archive written".to_string()),
    }
    lines
}

pub fn print_archive_report(inputs: &[InputRef], report: &ArchiveReport) {
    for line in format_archive_report(inputs, report) {
        println!("{}", line);
    }
}

// ============================================================================
// Checksum
// ============================================================================

pub fn format_checksum_report(
    inputs: &[InputRef],
    algorithm: HashAlgorithm,
    report: &BatchReport<ChecksumMatch>,
) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (input, result)) in inputs.iter().zip(&report.results).enumerate() {
        lines.push(input_line(i + 1, input));
        match result {
            ItemResult::Success(m) => {
                lines.push(format!("{}{}: {}", indent(1), algorithm, m.digest));
                match m.matches {
                    Some(true) => lines.push(format!("{}Matches expected", indent(1))),
                    Some(false) => lines.push(format!("{}DOES NOT match expected", indent(1))),
                    None => {}
                }
            }
            ItemResult::Failure(err) => lines.push(format!("{}Failed: {}", indent(1), err)),
        }
    }
    lines
}

pub fn print_checksum_report(
    inputs: &[InputRef],
    algorithm: HashAlgorithm,
    report: &BatchReport<ChecksumMatch>,
) {
    for line in format_checksum_report(inputs, algorithm, report) {
        println!("{}", line);
    }
}

// ============================================================================
// JSON reports
// ============================================================================

fn results_json<T>(
    inputs: &[InputRef],
    report: &BatchReport<T>,
    value: impl Fn(&T) -> Value,
) -> Value {
    let items: Vec<Value> = inputs
        .iter()
        .zip(&report.results)
        .map(|(input, result)| match result {
            ItemResult::Success(v) => json!({
                "input": input.path(),
                "ok": true,
                "result": value(v),
            }),
            ItemResult::Failure(err) => json!({
                "input": input.path(),
                "ok": false,
                "error": err.to_string(),
            }),
        })
        .collect();
    json!({
        "summary": report.summary,
        "items": items,
    })
}

pub fn save_report_json(screen: &str, inputs: &[InputRef], report: &BatchReport) -> Value {
    let mut value = results_json(inputs, report, |path: &PathBuf| json!(path));
    value["screen"] = json!(screen);
    value
}

pub fn archive_report_json(inputs: &[InputRef], report: &ArchiveReport) -> Value {
    let mut value = results_json(inputs, &report.entries, |name: &String| json!(name));
    value["screen"] = json!("zip");
    value["archive"] = json!(report.archive);
    value
}

pub fn checksum_report_json(
    inputs: &[InputRef],
    algorithm: HashAlgorithm,
    report: &BatchReport<ChecksumMatch>,
) -> Value {
    let mut value = results_json(inputs, report, |m: &ChecksumMatch| json!(m));
    value["screen"] = json!("checksum");
    value["algorithm"] = json!(algorithm);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saving::SaveError;
    use crate::types::ItemError;
    use crate::test_helpers::inputs;

    fn mixed_report() -> BatchReport {
        BatchReport::new(vec![
            ItemResult::Success(PathBuf::from("out/dawn.jpg")),
            ItemResult::Failure(ItemError::Save(SaveError::NoLocation)),
        ])
    }

    // =========================================================================
    // Progress
    // =========================================================================

    #[test]
    fn progress_line_while_running() {
        let progress = BatchProgress {
            completed: 2,
            total: Some(5),
        };
        assert_eq!(
            format_progress("watermarking", &progress),
            Some("watermarking 2/5".to_string())
        );
    }

    #[test]
    fn progress_idle_prints_nothing() {
        assert_eq!(format_progress("zip", &BatchProgress::IDLE), None);
    }

    #[test]
    fn summary_mentions_failures_only_when_present() {
        let ok = BatchSummary {
            succeeded: 3,
            failed: 0,
        };
        assert_eq!(format_summary(&ok), "Saved 3 of 3");
        let mixed = BatchSummary {
            succeeded: 1,
            failed: 2,
        };
        assert_eq!(format_summary(&mixed), "Saved 1 of 3 (2 failed)");
    }

    // =========================================================================
    // Save reports
    // =========================================================================

    #[test]
    fn save_report_lists_items_then_summary() {
        let lines = format_save_report(&inputs(&["/in/dawn.jpg", "/in/dusk.jpg"]), &mixed_report());
        assert_eq!(
            lines,
            vec![
                "001 dawn.jpg \u{2192} out/dawn.jpg",
                "002 dusk.jpg",
                "    Failed: save failed: no save directory configured",
                "Saved 1 of 2 (1 failed)",
            ]
        );
    }

    #[test]
    fn stitch_report_shows_location() {
        let report = BatchReport::new(vec![ItemResult::Success(PathBuf::from("out/a.png"))]);
        let lines = format_stitch_report(&inputs(&["a.png", "b.png"]), &report);
        assert_eq!(lines[0], "Stitched 2 inputs");
        assert_eq!(lines[1], "    \u{2192} out/a.png");
    }

    #[test]
    fn shared_lists_locations() {
        let lines = format_shared(&[PathBuf::from("/outbox/a.jpg")]);
        assert_eq!(lines, vec!["001 /outbox/a.jpg", "Shared 1 files"]);
    }

    // =========================================================================
    // Zip and checksum
    // =========================================================================

    #[test]
    fn archive_report_names_entries_and_archive() {
        let report = ArchiveReport {
            archive: Some(PathBuf::from("out/images.zip")),
            entries: BatchReport::new(vec![
                ItemResult::Success("a.jpg".to_string()),
                ItemResult::Success("a-1.jpg".to_string()),
            ]),
        };
        let lines = format_archive_report(&inputs(&["a.jpg", "x/a.jpg"]), &report);
        assert_eq!(lines[1], "002 a.jpg \u{2192} a-1.jpg");
        assert_eq!(lines[2], "Archive: out/images.zip");
    }

    #[test]
    fn checksum_report_shows_verdict() {
        let report = BatchReport::new(vec![ItemResult::Success(ChecksumMatch {
            digest: "abcd".into(),
            matches: Some(false),
        })]);
        let lines = format_checksum_report(&inputs(&["a.bin"]), HashAlgorithm::Sha256, &report);
        assert_eq!(
            lines,
            vec!["001 a.bin", "    sha256: abcd", "    DOES NOT match expected"]
        );
    }

    // =========================================================================
    // JSON
    // =========================================================================

    #[test]
    fn save_report_json_shape() {
        let value = save_report_json("conversion", &inputs(&["a.jpg", "b.jpg"]), &mixed_report());
        assert_eq!(value["screen"], "conversion");
        assert_eq!(value["summary"]["succeeded"], 1);
        assert_eq!(value["items"][0]["ok"], true);
        assert_eq!(value["items"][0]["result"], "out/dawn.jpg");
        assert_eq!(value["items"][1]["ok"], false);
    }

    #[test]
    fn checksum_json_includes_algorithm() {
        let report = BatchReport::new(vec![ItemResult::Success(ChecksumMatch {
            digest: "ff".into(),
            matches: None,
        })]);
        let value = checksum_report_json(&inputs(&["a"]), HashAlgorithm::Sha512, &report);
        assert_eq!(value["algorithm"], "sha512");
        assert_eq!(value["items"][0]["result"]["digest"], "ff");
        assert!(value["items"][0]["result"]["matches"].is_null());
    }
}
