//! Per-format metadata extractors.
//!
//! One extractor per supported container, all implementing
//! [`BinaryExtractor`] and dispatched through the closed
//! [`FormatExtractor`] enum that the format detector selects once per
//! file. All extractors parse from `&[u8]`; loading the bytes (and
//! bounding how many are loaded) is the caller's job.
//!
//! Failure semantics: `Ok` with an empty collection means the file parsed
//! correctly and simply contains nothing of interest; `Err(Unsupported)`
//! means this extractor cannot handle the input at all; `Err(Malformed*)`
//! means the input is truncated or invalid. Callers rely on the
//! distinction to decide whether a fallback is worth trying. A failure in
//! one capability never blocks the others.

pub mod archive;
pub(crate) mod bytes;
pub mod elf;
pub mod macho;
pub mod pe;

use crate::core::component::{SectionInfo, SymbolInfo};
use crate::detect::BinaryFormat;
use crate::error::Result;

/// Capability set shared by every per-format extractor.
pub trait BinaryExtractor {
    fn extract_symbols(&self, data: &[u8]) -> Result<Vec<SymbolInfo>>;
    fn extract_sections(&self, data: &[u8]) -> Result<Vec<SectionInfo>>;
    /// Best-effort version string; `Ok(None)` means parsed, none present.
    fn extract_version(&self, data: &[u8]) -> Result<Option<String>>;
    fn extract_dependencies(&self, data: &[u8]) -> Result<Vec<String>>;
    fn can_handle(&self, data: &[u8]) -> bool;
    fn format_name(&self) -> &'static str;
}

/// Closed dispatch over the supported formats, selected once by the
/// format detector.
#[derive(Debug, Clone, Copy)]
pub enum FormatExtractor {
    Elf(elf::ElfExtractor),
    MachO(macho::MachOExtractor),
    Pe(pe::PeExtractor),
    Archive(archive::ArchiveExtractor),
}

impl FormatExtractor {
    /// The extractor for a detected format, or `None` for `Unknown`.
    pub fn for_format(format: BinaryFormat) -> Option<FormatExtractor> {
        match format {
            BinaryFormat::Elf => Some(FormatExtractor::Elf(elf::ElfExtractor)),
            BinaryFormat::MachO => Some(FormatExtractor::MachO(macho::MachOExtractor)),
            BinaryFormat::Pe => Some(FormatExtractor::Pe(pe::PeExtractor)),
            BinaryFormat::Archive => Some(FormatExtractor::Archive(archive::ArchiveExtractor)),
            BinaryFormat::Unknown => None,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            FormatExtractor::Elf($inner) => $body,
            FormatExtractor::MachO($inner) => $body,
            FormatExtractor::Pe($inner) => $body,
            FormatExtractor::Archive($inner) => $body,
        }
    };
}

impl BinaryExtractor for FormatExtractor {
    fn extract_symbols(&self, data: &[u8]) -> Result<Vec<SymbolInfo>> {
        dispatch!(self, e => e.extract_symbols(data))
    }

    fn extract_sections(&self, data: &[u8]) -> Result<Vec<SectionInfo>> {
        dispatch!(self, e => e.extract_sections(data))
    }

    fn extract_version(&self, data: &[u8]) -> Result<Option<String>> {
        dispatch!(self, e => e.extract_version(data))
    }

    fn extract_dependencies(&self, data: &[u8]) -> Result<Vec<String>> {
        dispatch!(self, e => e.extract_dependencies(data))
    }

    fn can_handle(&self, data: &[u8]) -> bool {
        dispatch!(self, e => e.can_handle(data))
    }

    fn format_name(&self) -> &'static str {
        dispatch!(self, e => e.format_name())
    }
}
