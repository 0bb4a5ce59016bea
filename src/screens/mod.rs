//! One state holder per tool screen.
//!
//! | Screen | Shape | Output |
//! |---|---|---|
//! | [`watermarking`] | per item, [`StateHolder`](crate::holder::StateHolder) | one image per input |
//! | [`conversion`] | per item, [`StateHolder`](crate::holder::StateHolder) | one image per input |
//! | [`single_edit`] | per item, [`StateHolder`](crate::holder::StateHolder) | one image per input |
//! | [`stitching`] | all inputs at once | one image |
//! | [`svg`] | per item, traced | one SVG per input |
//! | [`zip`] | byte copy, no decode | one archive |
//! | [`checksum`] | streamed read | digests, nothing saved |
//!
//! Every screen runs its background work on a
//! [`BatchSlot`](crate::holder::BatchSlot), so the busy flag, progress and
//! cancellation behave the same everywhere.

pub mod checksum;
pub mod conversion;
pub mod single_edit;
pub mod stitching;
pub mod svg;
pub mod watermarking;
pub mod zip;

pub use checksum::{ChecksumMatch, ChecksumScreen, HashAlgorithm};
pub use conversion::{ConversionParams, ConversionScreen};
pub use single_edit::{EditParams, SingleEditScreen};
pub use stitching::StitchingScreen;
pub use svg::{SvgParams, SvgScreen};
pub use watermarking::WatermarkingScreen;
pub use zip::{ArchiveReport, ZipScreen};
