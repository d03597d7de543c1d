//! DWARF debug-information decoding.
//!
//! Two interchangeable implementations share the [`DebugInfoReader`]
//! contract: [`full::DwarfDecoder`] delegates to the `object`/`gimli`
//! toolkit and is the conformant tier; [`lite::LiteDwarfParser`] is a
//! dependency-free fallback that hand-rolls LEB128 decoding and the
//! DIE/line-program walks. A decoder instance holds per-file parser state
//! and must not be shared across concurrent tasks.

pub mod full;
pub mod lite;

use crate::error::Result;

/// Debug metadata recovered from one binary, each list de-duplicated and
/// insertion-ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    pub source_files: Vec<String>,
    pub compile_units: Vec<String>,
    pub functions: Vec<String>,
}

impl DebugInfo {
    pub fn is_empty(&self) -> bool {
        self.source_files.is_empty() && self.compile_units.is_empty() && self.functions.is_empty()
    }
}

/// Shared contract for DWARF decoders.
pub trait DebugInfoReader {
    /// Whether any DWARF section is present at all.
    fn has_dwarf_info(&self) -> bool;
    fn source_files(&self) -> Result<Vec<String>>;
    fn compile_units(&self) -> Result<Vec<String>>;
    fn functions(&self) -> Result<Vec<String>>;
    /// All three collections in one pass, to avoid re-parsing the binary
    /// once per capability.
    fn extract_all(&self) -> Result<DebugInfo>;
}

/// Decode debug info with the full decoder, falling back to the
/// lightweight tier when the toolkit cannot load the file or finds
/// nothing.
pub fn extract_debug_info(data: &[u8]) -> DebugInfo {
    if let Ok(decoder) = full::DwarfDecoder::load(data) {
        if decoder.has_dwarf_info() {
            if let Ok(info) = decoder.extract_all() {
                if !info.is_empty() {
                    return info;
                }
            }
        }
    }
    let lite = lite::LiteDwarfParser::new(data);
    lite.extract_all().unwrap_or_default()
}

/// Insertion-ordered add-if-absent, shared by both decoders.
pub(crate) fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}
