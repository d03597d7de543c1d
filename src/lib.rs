//! # Telchar
//!
//! Binary metadata extraction engine for SBOM generation.
//!
//! Telchar reads compiled artifacts (ELF, Mach-O thin and fat, PE and
//! Unix archives) and populates one [`core::component::ComponentInfo`]
//! record per file with symbols, sections, dependencies, a best-effort
//! version string and DWARF debug metadata. Records are handed whole to an
//! external SBOM serializer; this crate never writes back to the binaries
//! it reads.
//!
//! The pipeline is leaves-first: [`detect`] classifies a file from magic
//! bytes, [`extract`] holds one extractor per format behind a closed
//! dispatch enum, [`dwarf`] decodes debug info (a `gimli`-backed full
//! decoder with a dependency-free lightweight fallback), [`cache`]
//! memoizes symbol extraction, and [`pipeline`] drives many files through
//! all of the above, concurrently or serially.

/// Core data types module
pub mod core;

/// Error types
pub mod error;

/// Format detection from magic bytes
pub mod detect;

/// Per-format metadata extractors
pub mod extract;

/// DWARF debug-information decoding
pub mod dwarf;

/// Memoizing symbol cache
pub mod cache;

/// External detector interfaces (package manager, license, version)
pub mod detectors;

/// Extraction orchestration and parallel dispatch
pub mod pipeline;

/// Cryptographic hashing helpers
pub mod hashing;

/// Bounded file I/O
pub mod io;

/// Logging and tracing setup
pub mod logging;

pub use crate::core::component::{ComponentInfo, FileType, LinkerType, SectionInfo, SymbolInfo};
pub use crate::detect::BinaryFormat;
pub use crate::error::{Result, TelcharError};
pub use crate::pipeline::metadata::{ExtractorConfig, MetadataExtractor};
