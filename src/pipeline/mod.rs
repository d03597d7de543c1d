//! Extraction orchestration: the per-file state machine and the
//! fan-out/join layer that drives it over many files.

pub mod metadata;
pub mod parallel;

pub use metadata::{ExtractorConfig, MetadataExtractor};
pub use parallel::{process, process_serial};
