//! Conformant DWARF decoder backed by `object` and `gimli`.
//!
//! Loads the debug sections out of any container `object` can parse and
//! walks every compilation unit: unit names become compile units,
//! `DW_TAG_subprogram` names become functions, and the line program's
//! file table is the authoritative source of source file names.

use gimli::{EndianSlice, RunTimeEndian, Section as _};
use object::{Object, ObjectSection};
use tracing::debug;

use super::{push_unique, DebugInfo, DebugInfoReader};
use crate::error::Result;

type Reader<'a> = EndianSlice<'a, RunTimeEndian>;

/// A decoder instance owns its loaded section buffers and is tied to the
/// one file it was loaded from.
pub struct DwarfDecoder {
    sections: gimli::DwarfSections<Vec<u8>>,
    endian: RunTimeEndian,
}

impl DwarfDecoder {
    /// Load the DWARF sections of `data`. Fails only when the container
    /// itself cannot be parsed; absent debug sections load as empty.
    pub fn load(data: &[u8]) -> Result<Self> {
        let file = object::File::parse(data)?;
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let sections = gimli::DwarfSections::load(|id: gimli::SectionId| {
            Ok::<_, gimli::Error>(
                file.section_by_name(id.name())
                    .and_then(|s| s.uncompressed_data().ok())
                    .map(|cow| cow.into_owned())
                    .unwrap_or_default(),
            )
        })?;
        Ok(DwarfDecoder { sections, endian })
    }

    fn dwarf(&self) -> gimli::Dwarf<Reader<'_>> {
        self.sections
            .borrow(|section| EndianSlice::new(section, self.endian))
    }

    fn walk(&self, want_dies: bool, want_lines: bool) -> Result<DebugInfo> {
        let dwarf = self.dwarf();
        let mut info = DebugInfo::default();
        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = match dwarf.unit(header) {
                Ok(unit) => unit,
                Err(err) => {
                    debug!(?err, "skipping undecodable unit");
                    continue;
                }
            };
            if want_dies {
                let mut entries = unit.entries();
                while let Some(entry) = entries.next_dfs()? {
                    let target = match entry.tag() {
                        gimli::DW_TAG_compile_unit => &mut info.compile_units,
                        gimli::DW_TAG_subprogram => &mut info.functions,
                        _ => continue,
                    };
                    if let Some(value) = entry.attr_value(gimli::DW_AT_name) {
                        if let Ok(name) = dwarf.attr_string(&unit, value) {
                            push_unique(target, name.to_string_lossy().into_owned());
                        }
                    }
                }
            }
            if want_lines {
                if let Some(program) = unit.line_program.clone() {
                    let header = program.header();
                    for file in header.file_names() {
                        if let Ok(name) = dwarf.attr_string(&unit, file.path_name()) {
                            push_unique(
                                &mut info.source_files,
                                name.to_string_lossy().into_owned(),
                            );
                        }
                    }
                }
            }
        }
        Ok(info)
    }
}

impl DebugInfoReader for DwarfDecoder {
    fn has_dwarf_info(&self) -> bool {
        let dwarf = self.dwarf();
        !dwarf.debug_info.reader().is_empty()
            || !dwarf.debug_line.reader().is_empty()
            || !dwarf.debug_abbrev.reader().is_empty()
    }

    fn source_files(&self) -> Result<Vec<String>> {
        Ok(self.walk(false, true)?.source_files)
    }

    fn compile_units(&self) -> Result<Vec<String>> {
        Ok(self.walk(true, false)?.compile_units)
    }

    fn functions(&self) -> Result<Vec<String>> {
        Ok(self.walk(true, false)?.functions)
    }

    fn extract_all(&self) -> Result<DebugInfo> {
        self.walk(true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_garbage_containers() {
        assert!(DwarfDecoder::load(&[0u8; 32]).is_err());
    }

    #[test]
    fn elf_without_debug_sections_has_no_dwarf() {
        // Minimal 64-bit LE ELF header with zero sections parses as an
        // object file but carries no DWARF.
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(b"\x7fELF");
        data[4] = 2;
        data[5] = 1;
        data[6] = 1;
        data[16..18].copy_from_slice(&1u16.to_le_bytes()); // ET_REL
        data[18..20].copy_from_slice(&0x3eu16.to_le_bytes()); // EM_X86_64
        data[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        if let Ok(decoder) = DwarfDecoder::load(&data) {
            assert!(!decoder.has_dwarf_info());
            assert!(decoder.extract_all().unwrap().is_empty());
        }
    }
}
