//! Lightweight DWARF parser with no external parsing toolkit.
//!
//! Locates `.debug_info`, `.debug_line` and `.debug_abbrev` by exact name
//! in the ELF section-header string table and decodes just enough DWARF by
//! hand to recover compile units, function names and source files:
//! LEB128 integers, compile-unit headers, a DIE walk, and the line-program
//! header with its include-directory and file-name tables.
//!
//! The DIE walk is deliberately approximate: instead of consuming the
//! abbreviation table, it recognizes the compile-unit and subprogram tags,
//! opportunistically harvests an adjacent name string, and advances by a
//! fixed skip. It can misparse DIEs whose attributes fall outside the
//! recognized set; the `.debug_line` file table and the raw-byte heuristic
//! below backstop it, and the `gimli`-backed decoder is the conformant
//! tier. Every read is bounds-checked: truncated or corrupt input degrades
//! to "nothing found".

use memchr::memmem;
use tracing::debug;

use super::{push_unique, DebugInfo, DebugInfoReader};
use crate::error::Result;
use crate::extract::bytes::{read_cstr, read_u16, read_u32, read_u64};
use crate::extract::{elf::ElfExtractor, BinaryExtractor};

const DW_TAG_COMPILE_UNIT: u64 = 0x11;
const DW_TAG_SUBPROGRAM: u64 = 0x2e;

/// Upper bound on DIEs examined per unit; guards the fixed-skip walk
/// against pathological input.
const MAX_DIES_PER_UNIT: usize = 1000;

/// Fixed advance after each recognized DIE (documented approximation).
const DIE_SKIP: usize = 4;

const SOURCE_EXTENSIONS: &[&str] = &[
    ".c", ".cpp", ".cc", ".cxx", ".h", ".hpp", ".hh", ".hxx", ".rs",
];

#[derive(Debug, Clone, Copy)]
struct SectionRange {
    offset: usize,
    size: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct DwarfSections {
    debug_info: Option<SectionRange>,
    debug_line: Option<SectionRange>,
    debug_abbrev: Option<SectionRange>,
    little_endian: bool,
}

/// Decode an unsigned LEB128 at `*offset`, advancing past it.
///
/// 7 bits per byte, `0x80` continuation, little-endian accumulation.
/// Returns `None` on truncation or on a value that overflows 64 bits;
/// `*offset` is left unchanged on failure.
pub fn read_uleb128(data: &[u8], offset: &mut usize) -> Option<u64> {
    let start = *offset;
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *data.get(*offset)?;
        *offset += 1;
        if shift >= 64 || (shift == 63 && byte & 0x7e != 0) {
            *offset = start;
            return None;
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
    }
}

/// Decode a signed LEB128 at `*offset`, advancing past it.
///
/// Sign-extends from the final byte's sign bit (`0x40`).
pub fn read_sleb128(data: &[u8], offset: &mut usize) -> Option<i64> {
    let start = *offset;
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *data.get(*offset)?;
        *offset += 1;
        if shift >= 64 {
            *offset = start;
            return None;
        }
        result |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= u64::MAX << shift;
            }
            return Some(result as i64);
        }
    }
}

/// Compile-unit header: 4-byte length (with the `0xffffffff` escape
/// introducing an 8-byte 64-bit length), version, abbrev offset, address
/// size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UnitHeader {
    unit_length: u64,
    version: u16,
    abbrev_offset: u64,
    address_size: u8,
    /// Bytes consumed by the header itself.
    header_size: usize,
    /// Offset one past the end of this unit's contribution.
    unit_end: usize,
}

fn parse_unit_header(data: &[u8], off: usize, le: bool) -> Option<UnitHeader> {
    let first = read_u32(data, off, le)?;
    let (unit_length, mut pos, is_64) = if first == 0xffff_ffff {
        (read_u64(data, off + 4, le)?, off + 12, true)
    } else {
        (u64::from(first), off + 4, false)
    };
    let unit_end = pos.checked_add(usize::try_from(unit_length).ok()?)?;
    if unit_end > data.len() || unit_length == 0 {
        return None;
    }
    let version = read_u16(data, pos, le)?;
    pos += 2;
    let abbrev_offset = if is_64 {
        let v = read_u64(data, pos, le)?;
        pos += 8;
        v
    } else {
        let v = u64::from(read_u32(data, pos, le)?);
        pos += 4;
        v
    };
    let address_size = *data.get(pos)?;
    pos += 1;
    Some(UnitHeader {
        unit_length,
        version,
        abbrev_offset,
        address_size,
        header_size: pos - off,
        unit_end,
    })
}

/// Lightweight decoder bound to one file's bytes.
pub struct LiteDwarfParser<'a> {
    data: &'a [u8],
    sections: DwarfSections,
}

impl<'a> LiteDwarfParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let sections = find_debug_sections(data).unwrap_or_default();
        LiteDwarfParser { data, sections }
    }

    fn section(&self, range: Option<SectionRange>) -> &'a [u8] {
        let Some(range) = range else {
            return &[];
        };
        let end = range.offset.saturating_add(range.size).min(self.data.len());
        if range.offset >= self.data.len() {
            return &[];
        }
        &self.data[range.offset..end]
    }

    /// Walk `.debug_info` units, harvesting compile-unit and subprogram
    /// names by the fixed-skip approximation.
    fn parse_debug_info(&self) -> DebugInfo {
        let mut info = DebugInfo::default();
        let section = self.section(self.sections.debug_info);
        let le = self.sections.little_endian;
        let mut unit_off = 0usize;
        while unit_off < section.len() {
            let Some(header) = parse_unit_header(section, unit_off, le) else {
                break;
            };
            let mut off = unit_off + header.header_size;
            let mut dies = 0usize;
            while off < header.unit_end && dies < MAX_DIES_PER_UNIT {
                dies += 1;
                let Some(abbrev_code) = read_uleb128(section, &mut off) else {
                    break;
                };
                if abbrev_code == 0 {
                    continue; // end of a sibling list
                }
                if abbrev_code == DW_TAG_COMPILE_UNIT || abbrev_code == DW_TAG_SUBPROGRAM {
                    if let Some(name) = harvest_name(section, off) {
                        if abbrev_code == DW_TAG_COMPILE_UNIT {
                            push_unique(&mut info.compile_units, name);
                        } else {
                            push_unique(&mut info.functions, name);
                        }
                    }
                }
                // Approximate fixed skip in place of abbreviation-table
                // driven attribute decoding.
                if off + DIE_SKIP <= header.unit_end {
                    off += DIE_SKIP;
                } else {
                    break;
                }
            }
            unit_off = header.unit_end;
        }
        info
    }

    /// Parse the `.debug_line` program header and its file-name table,
    /// the authoritative source of per-unit source files.
    fn parse_debug_line(&self) -> Vec<String> {
        let section = self.section(self.sections.debug_line);
        let le = self.sections.little_endian;
        let mut files = Vec::new();
        let mut unit_off = 0usize;
        while unit_off + 4 <= section.len() {
            let Some(end) = parse_line_program(section, unit_off, le, &mut files) else {
                break;
            };
            if end <= unit_off {
                break;
            }
            unit_off = end;
        }
        files
    }

    /// Raw-byte fallback: scan for path-like substrings ending in a
    /// source extension.
    fn heuristic_source_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        for ext in SOURCE_EXTENSIONS {
            for hit in memmem::find_iter(self.data, ext.as_bytes()) {
                let end = hit + ext.len();
                // Token boundary: the extension must not continue into a
                // longer identifier (".c" inside ".cpp").
                if self
                    .data
                    .get(end)
                    .is_some_and(|&b| b.is_ascii_alphanumeric())
                {
                    continue;
                }
                let mut start = hit;
                while start > 0 && end - start < 512 {
                    let b = self.data[start - 1];
                    let is_path_byte = b.is_ascii_alphanumeric()
                        || matches!(b, b'/' | b'.' | b'_' | b'-' | b'+');
                    if !is_path_byte {
                        break;
                    }
                    start -= 1;
                }
                if start == hit {
                    continue; // bare extension with no stem
                }
                if let Ok(name) = std::str::from_utf8(&self.data[start..end]) {
                    push_unique(&mut files, name.to_string());
                }
            }
        }
        files
    }

    /// Function names recovered from the ELF symbol table when
    /// `.debug_info` yields nothing.
    fn functions_from_symbol_table(&self) -> Vec<String> {
        let Ok(symbols) = ElfExtractor.extract_symbols(self.data) else {
            return Vec::new();
        };
        let mut functions = Vec::new();
        for symbol in symbols {
            if symbol.is_defined
                && (symbol.section == ".text" || symbol.section.starts_with(".text."))
            {
                push_unique(&mut functions, symbol.name);
            }
        }
        functions
    }
}

impl DebugInfoReader for LiteDwarfParser<'_> {
    fn has_dwarf_info(&self) -> bool {
        self.sections.debug_info.is_some()
            || self.sections.debug_line.is_some()
            || self.sections.debug_abbrev.is_some()
    }

    fn source_files(&self) -> Result<Vec<String>> {
        let files = self.parse_debug_line();
        if !files.is_empty() {
            return Ok(files);
        }
        debug!("debug_line yielded nothing, falling back to heuristic scan");
        Ok(self.heuristic_source_files())
    }

    fn compile_units(&self) -> Result<Vec<String>> {
        Ok(self.parse_debug_info().compile_units)
    }

    fn functions(&self) -> Result<Vec<String>> {
        let functions = self.parse_debug_info().functions;
        if !functions.is_empty() {
            return Ok(functions);
        }
        Ok(self.functions_from_symbol_table())
    }

    fn extract_all(&self) -> Result<DebugInfo> {
        let mut info = self.parse_debug_info();
        info.source_files = self.source_files()?;
        if info.functions.is_empty() {
            info.functions = self.functions_from_symbol_table();
        }
        Ok(info)
    }
}

/// A name string is only harvested when it looks like one.
fn harvest_name(section: &[u8], off: usize) -> Option<String> {
    let name = read_cstr(section, off, 1024)?;
    if name.is_empty() || name.len() < 2 {
        return None;
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_graphic() || c == ' ')
    {
        return None;
    }
    Some(name)
}

/// Parse one line-number program, appending its file names. Returns the
/// offset one past this program's contribution, or `None` when the header
/// cannot be decoded.
fn parse_line_program(
    section: &[u8],
    start: usize,
    le: bool,
    files: &mut Vec<String>,
) -> Option<usize> {
    let first = read_u32(section, start, le)?;
    let (unit_length, mut off, is_64) = if first == 0xffff_ffff {
        (read_u64(section, start + 4, le)?, start + 12, true)
    } else {
        (u64::from(first), start + 4, false)
    };
    let unit_end = off.checked_add(usize::try_from(unit_length).ok()?)?;
    if unit_length == 0 || unit_end > section.len() {
        return None;
    }
    let version = read_u16(section, off, le)?;
    off += 2;
    if !(2..=4).contains(&version) {
        // DWARF 5 moved to directory/file entry formats this tier does
        // not decode; let the caller fall back.
        return None;
    }
    // header_length
    if is_64 {
        read_u64(section, off, le)?;
        off += 8;
    } else {
        read_u32(section, off, le)?;
        off += 4;
    }
    off += 1; // minimum_instruction_length
    if version >= 4 {
        off += 1; // maximum_operations_per_instruction
    }
    off += 1; // default_is_stmt
    off += 1; // line_base (signed)
    off += 1; // line_range
    let opcode_base = *section.get(off)?;
    off += 1;
    if opcode_base == 0 {
        return None;
    }
    // standard_opcode_lengths
    off = off.checked_add(opcode_base as usize - 1)?;
    if off >= unit_end {
        return None;
    }
    // include_directories: NUL-terminated strings, empty string terminates
    loop {
        let dir = read_cstr(section, off, unit_end - off)?;
        off += dir.len() + 1;
        if dir.is_empty() {
            break;
        }
        if off >= unit_end {
            return None;
        }
    }
    // file_names: name, then ULEB dir-index / mtime / length triple
    while off < unit_end {
        let name = read_cstr(section, off, unit_end - off)?;
        off += name.len() + 1;
        if name.is_empty() {
            break;
        }
        read_uleb128(section, &mut off)?; // directory index
        read_uleb128(section, &mut off)?; // modification time
        read_uleb128(section, &mut off)?; // file length
        push_unique(files, name);
    }
    Some(unit_end)
}

/// Locate the DWARF sections by exact name in the ELF section-header
/// string table. Hand-rolled on purpose: this tier must work without any
/// object-parsing dependency.
fn find_debug_sections(data: &[u8]) -> Option<DwarfSections> {
    if data.len() < 0x34 || &data[0..4] != b"\x7fELF" {
        return None;
    }
    let class64 = data[4] == 2;
    let le = data[5] != 2;
    let (e_shoff, e_shentsize, e_shnum, e_shstrndx) = if class64 {
        (
            read_u64(data, 40, le)? as usize,
            read_u16(data, 58, le)? as usize,
            read_u16(data, 60, le)? as usize,
            read_u16(data, 62, le)? as usize,
        )
    } else {
        (
            read_u32(data, 32, le)? as usize,
            read_u16(data, 46, le)? as usize,
            read_u16(data, 48, le)? as usize,
            read_u16(data, 50, le)? as usize,
        )
    };
    if e_shoff == 0 || e_shentsize == 0 || e_shnum == 0 || e_shstrndx >= e_shnum {
        return None;
    }
    if e_shoff.saturating_add(e_shentsize.saturating_mul(e_shnum)) > data.len() {
        return None;
    }
    let shdr_field = |index: usize, name_off: &mut u32, offset: &mut usize, size: &mut usize| {
        let off = e_shoff + index * e_shentsize;
        *name_off = read_u32(data, off, le).unwrap_or(0);
        if class64 {
            *offset = read_u64(data, off + 24, le).unwrap_or(0) as usize;
            *size = read_u64(data, off + 32, le).unwrap_or(0) as usize;
        } else {
            *offset = read_u32(data, off + 16, le).unwrap_or(0) as usize;
            *size = read_u32(data, off + 20, le).unwrap_or(0) as usize;
        }
    };
    let (mut str_name, mut str_off, mut str_size) = (0u32, 0usize, 0usize);
    shdr_field(e_shstrndx, &mut str_name, &mut str_off, &mut str_size);
    if str_off >= data.len() {
        return None;
    }
    let str_end = str_off.saturating_add(str_size).min(data.len());
    let shstrtab = &data[str_off..str_end];

    let mut sections = DwarfSections {
        little_endian: le,
        ..DwarfSections::default()
    };
    for i in 0..e_shnum {
        let (mut name_off, mut offset, mut size) = (0u32, 0usize, 0usize);
        shdr_field(i, &mut name_off, &mut offset, &mut size);
        let Some(name) = read_cstr(shstrtab, name_off as usize, 64) else {
            continue;
        };
        let range = SectionRange { offset, size };
        match name.as_str() {
            ".debug_info" => sections.debug_info = Some(range),
            ".debug_line" => sections.debug_line = Some(range),
            ".debug_abbrev" => sections.debug_abbrev = Some(range),
            _ => {}
        }
    }
    if sections.debug_info.is_none()
        && sections.debug_line.is_none()
        && sections.debug_abbrev.is_none()
    {
        return None;
    }
    Some(sections)
}
