//! PE/COFF metadata extraction.
//!
//! Walks DOS header -> PE signature -> COFF header. Symbols come from the
//! COFF symbol table (object files and binaries built with debug info),
//! dependencies from the import directory, the version from the optional
//! header's image-version fields. All fields are little-endian.

use super::bytes::{read_cstr, read_u16, read_u32};
use super::BinaryExtractor;
use crate::core::component::{SectionInfo, SymbolInfo};
use crate::error::{Result, TelcharError};

const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const SYMBOL_SIZE: usize = 18;
const IMPORT_DESCRIPTOR_SIZE: usize = 20;

const IMAGE_SYM_CLASS_EXTERNAL: u8 = 2;
const IMAGE_SYM_CLASS_WEAK_EXTERNAL: u8 = 105;

#[derive(Clone, Copy)]
struct SectionHeader {
    name_raw: [u8; 8],
    virtual_size: u32,
    virtual_address: u32,
    raw_size: u32,
    raw_ptr: u32,
    characteristics: u32,
}

struct PeFile<'a> {
    data: &'a [u8],
    coff_off: usize,
    nsections: usize,
    symtab_off: usize,
    nsymbols: usize,
    opt_size: usize,
    sections: Vec<SectionHeader>,
}

impl<'a> PeFile<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 2 || &data[..2] != b"MZ" {
            return Err(TelcharError::Unsupported("not a PE file".into()));
        }
        let e_lfanew = read_u32(data, 0x3c, true).ok_or_else(|| {
            TelcharError::MalformedBinary("truncated DOS header".into())
        })? as usize;
        let sig = data.get(e_lfanew..e_lfanew + 4).ok_or_else(|| {
            TelcharError::MalformedBinary("PE signature out of bounds".into())
        })?;
        if sig != PE_SIGNATURE {
            return Err(TelcharError::MalformedBinary("missing PE signature".into()));
        }
        let coff_off = e_lfanew + 4;
        if coff_off + COFF_HEADER_SIZE > data.len() {
            return Err(TelcharError::MalformedBinary("truncated COFF header".into()));
        }
        let nsections = read_u16(data, coff_off + 2, true).unwrap_or(0) as usize;
        let symtab_off = read_u32(data, coff_off + 8, true).unwrap_or(0) as usize;
        let nsymbols = read_u32(data, coff_off + 12, true).unwrap_or(0) as usize;
        let opt_size = read_u16(data, coff_off + 16, true).unwrap_or(0) as usize;

        let table_off = coff_off + COFF_HEADER_SIZE + opt_size;
        let mut sections = Vec::with_capacity(nsections);
        for i in 0..nsections {
            let off = table_off + i * SECTION_HEADER_SIZE;
            let Some(raw) = data.get(off..off + SECTION_HEADER_SIZE) else {
                return Err(TelcharError::MalformedBinary(
                    "section table out of bounds".into(),
                ));
            };
            let mut name_raw = [0u8; 8];
            name_raw.copy_from_slice(&raw[..8]);
            sections.push(SectionHeader {
                name_raw,
                virtual_size: read_u32(data, off + 8, true).unwrap_or(0),
                virtual_address: read_u32(data, off + 12, true).unwrap_or(0),
                raw_size: read_u32(data, off + 16, true).unwrap_or(0),
                raw_ptr: read_u32(data, off + 20, true).unwrap_or(0),
                characteristics: read_u32(data, off + 36, true).unwrap_or(0),
            });
        }
        Ok(PeFile {
            data,
            coff_off,
            nsections,
            symtab_off,
            nsymbols,
            opt_size,
            sections,
        })
    }

    /// Translate a relative virtual address to a file offset.
    fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        for s in &self.sections {
            let span = s.virtual_size.max(s.raw_size);
            if rva >= s.virtual_address && rva < s.virtual_address.saturating_add(span) {
                return Some((rva - s.virtual_address + s.raw_ptr) as usize);
            }
        }
        None
    }

    fn section_name(&self, header: &SectionHeader) -> String {
        let end = header
            .name_raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(header.name_raw.len());
        String::from_utf8_lossy(&header.name_raw[..end]).into_owned()
    }

    /// Import-directory RVA from the optional header, if present.
    fn import_directory_rva(&self) -> Option<u32> {
        let opt_off = self.coff_off + COFF_HEADER_SIZE;
        if self.opt_size == 0 {
            return None;
        }
        let magic = read_u16(self.data, opt_off, true)?;
        let (ndirs_off, dirs_off) = match magic {
            0x10b => (opt_off + 92, opt_off + 96),   // PE32
            0x20b => (opt_off + 108, opt_off + 112), // PE32+
            _ => return None,
        };
        let ndirs = read_u32(self.data, ndirs_off, true)?;
        if ndirs < 2 {
            return None;
        }
        // Directory entry 1 is the import table.
        let rva = read_u32(self.data, dirs_off + 8, true)?;
        if rva == 0 {
            None
        } else {
            Some(rva)
        }
    }

    /// "MajorImageVersion.MinorImageVersion" when either is nonzero.
    fn image_version(&self) -> Option<String> {
        let opt_off = self.coff_off + COFF_HEADER_SIZE;
        if self.opt_size < 48 {
            return None;
        }
        let major = read_u16(self.data, opt_off + 44, true)?;
        let minor = read_u16(self.data, opt_off + 46, true)?;
        if major == 0 && minor == 0 {
            None
        } else {
            Some(format!("{major}.{minor}"))
        }
    }
}

/// PE extractor over in-memory file bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeExtractor;

impl BinaryExtractor for PeExtractor {
    fn extract_symbols(&self, data: &[u8]) -> Result<Vec<SymbolInfo>> {
        let pe = PeFile::parse(data)?;
        if pe.symtab_off == 0 || pe.nsymbols == 0 {
            return Ok(Vec::new()); // no COFF symbol table (common for linked images)
        }
        // The string table begins immediately after the symbol table.
        let strtab_off = pe.symtab_off + pe.nsymbols * SYMBOL_SIZE;
        let mut symbols: Vec<SymbolInfo> = Vec::new();
        let mut i = 0usize;
        while i < pe.nsymbols {
            let off = pe.symtab_off + i * SYMBOL_SIZE;
            let Some(raw) = data.get(off..off + SYMBOL_SIZE) else {
                break;
            };
            let naux = raw[17] as usize;
            let name = if raw[..4] == [0, 0, 0, 0] {
                // Long name: offset into the string table
                let str_off = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
                read_cstr(data, strtab_off + str_off, 512).unwrap_or_default()
            } else {
                let end = raw[..8].iter().position(|&b| b == 0).unwrap_or(8);
                String::from_utf8_lossy(&raw[..end]).into_owned()
            };
            let value = read_u32(data, off + 8, true).unwrap_or(0);
            let section_number = read_u16(data, off + 12, true).unwrap_or(0) as i16;
            let storage_class = raw[16];
            i += 1 + naux; // skip auxiliary records
            if name.is_empty() {
                continue;
            }
            let is_defined = section_number > 0;
            let section = if is_defined {
                pe.sections
                    .get(section_number as usize - 1)
                    .map(|s| pe.section_name(s))
                    .unwrap_or_default()
            } else {
                String::new()
            };
            if !symbols.iter().any(|s| s.name == name) {
                symbols.push(SymbolInfo {
                    name,
                    address: value as u64,
                    size: 0,
                    is_defined,
                    is_weak: storage_class == IMAGE_SYM_CLASS_WEAK_EXTERNAL,
                    is_global: storage_class == IMAGE_SYM_CLASS_EXTERNAL,
                    section,
                });
            }
        }
        Ok(symbols)
    }

    fn extract_sections(&self, data: &[u8]) -> Result<Vec<SectionInfo>> {
        let pe = PeFile::parse(data)?;
        let mut sections = Vec::with_capacity(pe.nsections);
        for s in &pe.sections {
            sections.push(SectionInfo {
                name: pe.section_name(s),
                address: s.virtual_address as u64,
                size: s.virtual_size.max(s.raw_size) as u64,
                flags: s.characteristics as u64,
                section_type: "pe_section".to_string(),
            });
        }
        Ok(sections)
    }

    fn extract_version(&self, data: &[u8]) -> Result<Option<String>> {
        let pe = PeFile::parse(data)?;
        Ok(pe.image_version())
    }

    fn extract_dependencies(&self, data: &[u8]) -> Result<Vec<String>> {
        let pe = PeFile::parse(data)?;
        let Some(import_rva) = pe.import_directory_rva() else {
            return Ok(Vec::new());
        };
        let Some(mut off) = pe.rva_to_offset(import_rva) else {
            return Ok(Vec::new());
        };
        let mut deps: Vec<String> = Vec::new();
        // Import descriptors terminate at an all-zero entry.
        while let Some(raw) = data.get(off..off + IMPORT_DESCRIPTOR_SIZE) {
            if raw.iter().all(|&b| b == 0) {
                break;
            }
            let name_rva = u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]);
            if let Some(name_off) = pe.rva_to_offset(name_rva) {
                if let Some(dll) = read_cstr(data, name_off, 256) {
                    if !dll.is_empty() && !deps.contains(&dll) {
                        deps.push(dll);
                    }
                }
            }
            off += IMPORT_DESCRIPTOR_SIZE;
        }
        Ok(deps)
    }

    fn can_handle(&self, data: &[u8]) -> bool {
        PeFile::parse(data).is_ok()
    }

    fn format_name(&self) -> &'static str {
        "PE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a minimal PE32+ image: one `.text` section and an import
    /// directory naming a single DLL.
    fn minimal_pe(dll_name: &[u8]) -> Vec<u8> {
        let e_lfanew = 0x80usize;
        let opt_size = 112 + 16 * 8; // PE32+ fixed part + 16 directories
        let mut data = vec![0u8; 0x400];
        data[0] = b'M';
        data[1] = b'Z';
        data[0x3c..0x40].copy_from_slice(&(e_lfanew as u32).to_le_bytes());
        data[e_lfanew..e_lfanew + 4].copy_from_slice(b"PE\0\0");
        let coff = e_lfanew + 4;
        data[coff..coff + 2].copy_from_slice(&0x8664u16.to_le_bytes()); // machine
        data[coff + 2..coff + 4].copy_from_slice(&1u16.to_le_bytes()); // nsections
        data[coff + 16..coff + 18].copy_from_slice(&(opt_size as u16).to_le_bytes());
        let opt = coff + 20;
        data[opt..opt + 2].copy_from_slice(&0x20bu16.to_le_bytes()); // PE32+
        data[opt + 44..opt + 46].copy_from_slice(&2u16.to_le_bytes()); // major image ver
        data[opt + 46..opt + 48].copy_from_slice(&5u16.to_le_bytes()); // minor image ver
        data[opt + 108..opt + 112].copy_from_slice(&16u32.to_le_bytes()); // ndirs
        // import table directory: rva 0x2000
        data[opt + 112 + 8..opt + 112 + 12].copy_from_slice(&0x2000u32.to_le_bytes());
        data[opt + 112 + 12..opt + 112 + 16].copy_from_slice(&40u32.to_le_bytes());
        // section header: .idata, va 0x2000, raw at 0x200
        let sect = opt + opt_size;
        data[sect..sect + 6].copy_from_slice(b".idata");
        data[sect + 8..sect + 12].copy_from_slice(&0x100u32.to_le_bytes()); // vsize
        data[sect + 12..sect + 16].copy_from_slice(&0x2000u32.to_le_bytes()); // va
        data[sect + 16..sect + 20].copy_from_slice(&0x100u32.to_le_bytes()); // raw size
        data[sect + 20..sect + 24].copy_from_slice(&0x200u32.to_le_bytes()); // raw ptr
        // import descriptor at file 0x200: name rva 0x2040
        data[0x200 + 12..0x200 + 16].copy_from_slice(&0x2040u32.to_le_bytes());
        // terminator descriptor is already zeroed
        let name_off = 0x200 + 0x40;
        data[name_off..name_off + dll_name.len()].copy_from_slice(dll_name);
        data
    }

    #[test]
    fn imports_name_the_dll() {
        let data = minimal_pe(b"KERNEL32.dll");
        let deps = PeExtractor.extract_dependencies(&data).unwrap();
        assert_eq!(deps, vec!["KERNEL32.dll".to_string()]);
    }

    #[test]
    fn image_version_is_reported() {
        let data = minimal_pe(b"KERNEL32.dll");
        let version = PeExtractor.extract_version(&data).unwrap();
        assert_eq!(version.as_deref(), Some("2.5"));
    }

    #[test]
    fn sections_are_listed() {
        let data = minimal_pe(b"KERNEL32.dll");
        let sections = PeExtractor.extract_sections(&data).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, ".idata");
        assert_eq!(sections[0].address, 0x2000);
    }

    #[test]
    fn non_pe_is_unsupported() {
        let err = PeExtractor.extract_symbols(b"\x7fELF").unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn missing_symbol_table_is_empty_not_error() {
        let data = minimal_pe(b"KERNEL32.dll");
        assert!(PeExtractor.extract_symbols(&data).unwrap().is_empty());
    }
}
