//! ELF (Executable and Linkable Format) metadata extraction.
//!
//! Hand-rolled section-header walk over 32- and 64-bit ELF in either byte
//! order. Symbols come from `.symtab` and `.dynsym`, dependencies from
//! `DT_NEEDED`, the version from `DT_SONAME` (falling back to the
//! `.comment` producer string).

use tracing::debug;

use super::bytes::{read_cstr, read_u16, read_u32, read_u64};
use super::BinaryExtractor;
use crate::core::component::{SectionInfo, SymbolInfo};
use crate::error::{Result, TelcharError};

const SHT_SYMTAB: u32 = 2;
const SHT_DYNSYM: u32 = 11;
const SHT_DYNAMIC: u32 = 6;

const DT_NEEDED: i64 = 1;
const DT_SONAME: i64 = 14;

/// Longest symbol or library name we will chase through a string table.
const MAX_NAME: usize = 512;

#[derive(Clone, Copy)]
struct Shdr {
    name_off: u32,
    sh_type: u32,
    sh_flags: u64,
    sh_addr: u64,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_entsize: u64,
}

struct ElfFile<'a> {
    data: &'a [u8],
    class64: bool,
    le: bool,
    shdrs: Vec<Shdr>,
    shstrndx: usize,
}

impl<'a> ElfFile<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 4 || &data[0..4] != b"\x7fELF" {
            return Err(TelcharError::Unsupported("not an ELF file".into()));
        }
        if data.len() < 0x34 {
            return Err(TelcharError::MalformedBinary("truncated ELF header".into()));
        }
        let class64 = match data[4] {
            1 => false,
            2 => true,
            c => {
                return Err(TelcharError::MalformedBinary(format!(
                    "bad EI_CLASS {c}"
                )))
            }
        };
        let le = match data[5] {
            1 => true,
            2 => false,
            d => {
                return Err(TelcharError::MalformedBinary(format!("bad EI_DATA {d}")))
            }
        };
        let (e_shoff, e_shentsize, e_shnum, e_shstrndx) = if class64 {
            (
                read_u64(data, 40, le).unwrap_or(0) as usize,
                read_u16(data, 58, le).unwrap_or(0) as usize,
                read_u16(data, 60, le).unwrap_or(0) as usize,
                read_u16(data, 62, le).unwrap_or(0) as usize,
            )
        } else {
            (
                read_u32(data, 32, le).unwrap_or(0) as usize,
                read_u16(data, 46, le).unwrap_or(0) as usize,
                read_u16(data, 48, le).unwrap_or(0) as usize,
                read_u16(data, 50, le).unwrap_or(0) as usize,
            )
        };
        if e_shoff == 0 || e_shentsize == 0 || e_shnum == 0 {
            // Valid ELF with no section table (e.g. fully stripped core)
            return Ok(ElfFile {
                data,
                class64,
                le,
                shdrs: Vec::new(),
                shstrndx: 0,
            });
        }
        if e_shoff.saturating_add(e_shentsize.saturating_mul(e_shnum)) > data.len() {
            return Err(TelcharError::MalformedBinary(
                "section header table out of bounds".into(),
            ));
        }
        let mut shdrs = Vec::with_capacity(e_shnum);
        for i in 0..e_shnum {
            let off = e_shoff + i * e_shentsize;
            let shdr = if class64 {
                Shdr {
                    name_off: read_u32(data, off, le).unwrap_or(0),
                    sh_type: read_u32(data, off + 4, le).unwrap_or(0),
                    sh_flags: read_u64(data, off + 8, le).unwrap_or(0),
                    sh_addr: read_u64(data, off + 16, le).unwrap_or(0),
                    sh_offset: read_u64(data, off + 24, le).unwrap_or(0),
                    sh_size: read_u64(data, off + 32, le).unwrap_or(0),
                    sh_link: read_u32(data, off + 40, le).unwrap_or(0),
                    sh_entsize: read_u64(data, off + 56, le).unwrap_or(0),
                }
            } else {
                Shdr {
                    name_off: read_u32(data, off, le).unwrap_or(0),
                    sh_type: read_u32(data, off + 4, le).unwrap_or(0),
                    sh_flags: read_u32(data, off + 8, le).unwrap_or(0) as u64,
                    sh_addr: read_u32(data, off + 12, le).unwrap_or(0) as u64,
                    sh_offset: read_u32(data, off + 16, le).unwrap_or(0) as u64,
                    sh_size: read_u32(data, off + 20, le).unwrap_or(0) as u64,
                    sh_link: read_u32(data, off + 24, le).unwrap_or(0),
                    sh_entsize: read_u32(data, off + 36, le).unwrap_or(0) as u64,
                }
            };
            shdrs.push(shdr);
        }
        Ok(ElfFile {
            data,
            class64,
            le,
            shdrs,
            shstrndx: e_shstrndx,
        })
    }

    /// The in-bounds byte range of a section, clamped to the file.
    fn section_bytes(&self, shdr: &Shdr) -> &'a [u8] {
        let base = shdr.sh_offset as usize;
        if base >= self.data.len() {
            return &[];
        }
        let end = base
            .saturating_add(shdr.sh_size as usize)
            .min(self.data.len());
        &self.data[base..end]
    }

    fn section_name(&self, shdr: &Shdr) -> String {
        let Some(shstr) = self.shdrs.get(self.shstrndx) else {
            return String::new();
        };
        let table = self.section_bytes(shstr);
        read_cstr(table, shdr.name_off as usize, MAX_NAME).unwrap_or_default()
    }

    fn section_names(&self) -> Vec<String> {
        self.shdrs.iter().map(|s| self.section_name(s)).collect()
    }
}

fn section_type_name(sh_type: u32) -> String {
    match sh_type {
        0 => "SHT_NULL".to_string(),
        1 => "SHT_PROGBITS".to_string(),
        2 => "SHT_SYMTAB".to_string(),
        3 => "SHT_STRTAB".to_string(),
        4 => "SHT_RELA".to_string(),
        5 => "SHT_HASH".to_string(),
        6 => "SHT_DYNAMIC".to_string(),
        7 => "SHT_NOTE".to_string(),
        8 => "SHT_NOBITS".to_string(),
        9 => "SHT_REL".to_string(),
        11 => "SHT_DYNSYM".to_string(),
        14 => "SHT_INIT_ARRAY".to_string(),
        15 => "SHT_FINI_ARRAY".to_string(),
        other => format!("{other:#x}"),
    }
}

/// ELF extractor over in-memory file bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfExtractor;

impl BinaryExtractor for ElfExtractor {
    fn extract_symbols(&self, data: &[u8]) -> Result<Vec<SymbolInfo>> {
        let elf = ElfFile::parse(data)?;
        let names = elf.section_names();
        let mut symbols: Vec<SymbolInfo> = Vec::new();
        // .symtab first so static symbols win the dedup; .dynsym fills in
        // for stripped objects.
        for &want in &[SHT_SYMTAB, SHT_DYNSYM] {
            for shdr in elf.shdrs.iter().filter(|s| s.sh_type == want) {
                collect_symbols(&elf, shdr, &names, &mut symbols);
            }
        }
        Ok(symbols)
    }

    fn extract_sections(&self, data: &[u8]) -> Result<Vec<SectionInfo>> {
        let elf = ElfFile::parse(data)?;
        let mut sections = Vec::with_capacity(elf.shdrs.len());
        for shdr in &elf.shdrs {
            let name = elf.section_name(shdr);
            if name.is_empty() && shdr.sh_type == 0 {
                continue; // the null section
            }
            sections.push(SectionInfo {
                name,
                address: shdr.sh_addr,
                size: shdr.sh_size,
                flags: shdr.sh_flags,
                section_type: section_type_name(shdr.sh_type),
            });
        }
        Ok(sections)
    }

    fn extract_version(&self, data: &[u8]) -> Result<Option<String>> {
        let elf = ElfFile::parse(data)?;
        if let Some(soname) = dynamic_string(&elf, DT_SONAME) {
            if let Some(version) = version_from_soname(&soname) {
                return Ok(Some(version));
            }
        }
        // Producer string from .comment, e.g. "GCC: (GNU) 13.2.0"
        for shdr in &elf.shdrs {
            if elf.section_name(shdr) == ".comment" {
                let bytes = elf.section_bytes(shdr);
                if let Some(comment) = read_cstr(bytes, 0, 256) {
                    if !comment.is_empty() {
                        return Ok(Some(comment));
                    }
                }
            }
        }
        Ok(None)
    }

    fn extract_dependencies(&self, data: &[u8]) -> Result<Vec<String>> {
        let elf = ElfFile::parse(data)?;
        Ok(needed_libraries(&elf))
    }

    fn can_handle(&self, data: &[u8]) -> bool {
        data.len() >= 4 && &data[0..4] == b"\x7fELF"
    }

    fn format_name(&self) -> &'static str {
        "ELF"
    }
}

fn collect_symbols(elf: &ElfFile, shdr: &Shdr, names: &[String], out: &mut Vec<SymbolInfo>) {
    if shdr.sh_entsize == 0 || shdr.sh_size == 0 {
        return;
    }
    let Some(strtab) = elf.shdrs.get(shdr.sh_link as usize) else {
        return;
    };
    let strtab = elf.section_bytes(strtab);
    let table = elf.section_bytes(shdr);
    let esize = shdr.sh_entsize as usize;
    let expected = if elf.class64 { 24 } else { 16 };
    if esize < expected {
        return;
    }
    let mut off = 0usize;
    while off + esize <= table.len() {
        let (st_name, st_value, st_size, st_info, st_shndx) = if elf.class64 {
            (
                read_u32(table, off, elf.le).unwrap_or(0) as usize,
                read_u64(table, off + 8, elf.le).unwrap_or(0),
                read_u64(table, off + 16, elf.le).unwrap_or(0),
                table[off + 4],
                read_u16(table, off + 6, elf.le).unwrap_or(0),
            )
        } else {
            (
                read_u32(table, off, elf.le).unwrap_or(0) as usize,
                read_u32(table, off + 4, elf.le).unwrap_or(0) as u64,
                read_u32(table, off + 8, elf.le).unwrap_or(0) as u64,
                table[off + 12],
                read_u16(table, off + 14, elf.le).unwrap_or(0),
            )
        };
        off += esize;
        if st_name == 0 {
            continue;
        }
        let Some(name) = read_cstr(strtab, st_name, MAX_NAME) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let bind = st_info >> 4; // STB_GLOBAL=1, STB_WEAK=2
        let is_defined = st_shndx != 0; // SHN_UNDEF
        let section = if is_defined && (st_shndx as usize) < names.len() && st_shndx < 0xff00 {
            names[st_shndx as usize].clone()
        } else {
            String::new()
        };
        if !out.iter().any(|s| s.name == name) {
            out.push(SymbolInfo {
                name,
                address: st_value,
                size: st_size,
                is_defined,
                is_weak: bind == 2,
                is_global: bind == 1,
                section,
            });
        }
    }
}

/// All `DT_NEEDED` entries, in dynamic-table order.
fn needed_libraries(elf: &ElfFile) -> Vec<String> {
    let mut libs: Vec<String> = Vec::new();
    for shdr in elf.shdrs.iter().filter(|s| s.sh_type == SHT_DYNAMIC) {
        let Some(strtab) = elf.shdrs.get(shdr.sh_link as usize) else {
            continue;
        };
        let strtab = elf.section_bytes(strtab);
        let table = elf.section_bytes(shdr);
        let entsize = if elf.class64 { 16 } else { 8 };
        let mut off = 0usize;
        while off + entsize <= table.len() {
            let (d_tag, d_val) = if elf.class64 {
                (
                    read_u64(table, off, elf.le).unwrap_or(0) as i64,
                    read_u64(table, off + 8, elf.le).unwrap_or(0),
                )
            } else {
                (
                    read_u32(table, off, elf.le).unwrap_or(0) as i32 as i64,
                    read_u32(table, off + 4, elf.le).unwrap_or(0) as u64,
                )
            };
            off += entsize;
            if d_tag == 0 {
                break; // DT_NULL
            }
            if d_tag == DT_NEEDED {
                if let Some(lib) = read_cstr(strtab, d_val as usize, MAX_NAME) {
                    if !lib.is_empty() && !libs.contains(&lib) {
                        libs.push(lib);
                    }
                }
            }
        }
    }
    debug!(count = libs.len(), "ELF DT_NEEDED entries");
    libs
}

/// First string-valued entry for a dynamic tag.
fn dynamic_string(elf: &ElfFile, tag: i64) -> Option<String> {
    for shdr in elf.shdrs.iter().filter(|s| s.sh_type == SHT_DYNAMIC) {
        let strtab = elf.shdrs.get(shdr.sh_link as usize)?;
        let strtab = elf.section_bytes(strtab);
        let table = elf.section_bytes(shdr);
        let entsize = if elf.class64 { 16 } else { 8 };
        let mut off = 0usize;
        while off + entsize <= table.len() {
            let (d_tag, d_val) = if elf.class64 {
                (
                    read_u64(table, off, elf.le).unwrap_or(0) as i64,
                    read_u64(table, off + 8, elf.le).unwrap_or(0),
                )
            } else {
                (
                    read_u32(table, off, elf.le).unwrap_or(0) as i32 as i64,
                    read_u32(table, off + 4, elf.le).unwrap_or(0) as u64,
                )
            };
            off += entsize;
            if d_tag == 0 {
                break;
            }
            if d_tag == tag {
                return read_cstr(strtab, d_val as usize, MAX_NAME);
            }
        }
    }
    None
}

/// "libfoo.so.1.2.3" -> "1.2.3"
fn version_from_soname(soname: &str) -> Option<String> {
    let (_, version) = soname.split_once(".so.")?;
    if !version.is_empty() && version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Some(version.to_string())
    } else {
        None
    }
}

/// Whether any `.debug*` section is present.
pub fn has_debug_sections(data: &[u8]) -> bool {
    let Ok(elf) = ElfFile::parse(data) else {
        return false;
    };
    elf.shdrs
        .iter()
        .any(|s| elf.section_name(s).starts_with(".debug"))
}

/// Stripped heuristic over section presence.
///
/// Not stripped when `.symtab` or `.debug*` sections exist; an object with
/// only `.dynsym` (with or without an external-debug pointer) counts as
/// stripped, as does one with no symbols at all.
pub fn is_stripped(data: &[u8]) -> bool {
    let Ok(elf) = ElfFile::parse(data) else {
        return true;
    };
    let mut has_symtab = false;
    let mut has_dynsym = false;
    let mut has_debug = false;
    for shdr in &elf.shdrs {
        match shdr.sh_type {
            SHT_SYMTAB => has_symtab = true,
            SHT_DYNSYM => has_dynsym = true,
            _ => {}
        }
        if elf.section_name(shdr).starts_with(".debug") {
            has_debug = true;
        }
    }
    decide_stripped(has_symtab, has_dynsym, has_debug)
}

fn decide_stripped(has_symtab: bool, has_dynsym: bool, debug_info_present: bool) -> bool {
    if has_symtab {
        return false;
    }
    if debug_info_present {
        return false;
    }
    if has_dynsym && !has_symtab {
        return true;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripped_heuristic_with_symtab_is_false() {
        assert!(!decide_stripped(true, true, false));
        assert!(!decide_stripped(true, false, false));
    }

    #[test]
    fn debug_info_means_not_stripped() {
        assert!(!decide_stripped(false, true, true));
        assert!(!decide_stripped(false, false, true));
    }

    #[test]
    fn dynsym_only_or_nothing_is_stripped() {
        assert!(decide_stripped(false, true, false));
        assert!(decide_stripped(false, false, false));
    }

    #[test]
    fn soname_version_suffix() {
        assert_eq!(version_from_soname("libfoo.so.1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(version_from_soname("libfoo.so.6").as_deref(), Some("6"));
        assert_eq!(version_from_soname("libfoo.so"), None);
        assert_eq!(version_from_soname("libfoo.so.x"), None);
    }

    #[test]
    fn non_elf_is_unsupported() {
        let err = ElfExtractor.extract_symbols(b"MZ\x90\x00").unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn truncated_section_table_is_malformed() {
        // Valid magic + 64-bit header claiming a section table far past EOF
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(b"\x7fELF");
        data[4] = 2; // ELFCLASS64
        data[5] = 1; // little-endian
        data[40..48].copy_from_slice(&0x10_000u64.to_le_bytes()); // e_shoff
        data[58..60].copy_from_slice(&64u16.to_le_bytes()); // e_shentsize
        data[60..62].copy_from_slice(&4u16.to_le_bytes()); // e_shnum
        let err = ElfExtractor.extract_sections(&data).unwrap_err();
        assert!(matches!(err, TelcharError::MalformedBinary(_)));
    }
}
