//! # Image Toolbox
//!
//! Batch image tools built around one cancellable processing core. Each tool
//! ("screen") keeps an observable state (inputs, parameters, preview, busy
//! flag, progress) and turns commands into background work that decodes,
//! transforms, encodes and saves every selected input.
//!
//! # Architecture: Screen → Slot → Batch
//!
//! ```text
//! command ──► state holder ──► task slot ──► run_batch ──► per-item pipeline
//!   │             │               │              │            decode → render
//!   │             │               │              │            → encode → save
//!   │             ▼               │              ▼
//!   │        Store<State> ◄───────┴────── progress (k of n)
//!   ▼             │
//! on_result ◄─────┘  (only if the batch was not cancelled)
//! ```
//!
//! - A screen owns exactly one [`task::TaskSlot`]: starting a batch cancels
//!   the previous one, and a cancelled batch never publishes results.
//! - [`batch::run_batch`] isolates failures per item. One bad file turns into
//!   a failed entry in the report, never an aborted batch.
//! - State lives in a [`state::Store`]; observers subscribe and receive a
//!   snapshot after every change.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Input handles, progress, per-item results and batch reports |
//! | [`task`] | Cancel tokens and the single-occupancy task slot |
//! | [`batch`] | Sequential batch runner with failure isolation and progress |
//! | [`state`] | Observable store and the preview debouncer |
//! | [`holder`] | Generic per-item state holder and the [`holder::Pipeline`] trait |
//! | [`screens`] | The seven tool screens |
//! | [`imaging`] | Decode/scale backend, encoder, geometry math, EXIF carry-over |
//! | [`filters`] | Per-pixel and geometric filters for the edit screen |
//! | [`watermark`] | Watermark parameters and the stamping implementation |
//! | [`stitch`] | Joining images into one strip |
//! | [`saving`] | File naming, collision handling and save registration |
//! | [`share`] | Share cache and outbox |
//! | [`config`] | `toolbox.toml` loading, validation, merging |
//! | [`output`] | CLI output formatting and JSON reports |
//!
//! # Design Decisions
//!
//! ## Threads, Not an Async Runtime
//!
//! Batch work is CPU-bound and runs one item at a time per screen, so each
//! batch gets a plain OS thread and cooperates with cancellation through an
//! atomic flag checked between steps. Parallelism inside a step (scaling
//! the inputs of a stitch) uses the global rayon pool.
//!
//! ## Sequential Items
//!
//! Items in a batch are processed in input order, one after another.
//! Progress is then a simple counter, sequence numbers in output names match
//! the input order, and peak memory stays at one decoded image.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, scaling and encoding go through the `image` crate only; no
//! system libraries are required.

pub mod batch;
pub mod config;
pub mod filters;
pub mod holder;
pub mod imaging;
pub mod output;
pub mod saving;
pub mod screens;
pub mod share;
pub mod state;
pub mod stitch;
pub mod task;
pub mod types;
pub mod watermark;

#[cfg(test)]
pub(crate) mod test_helpers;
