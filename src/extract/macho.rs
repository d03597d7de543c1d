//! Mach-O metadata extraction, including fat (universal) containers.
//!
//! Fat headers are parsed big-endian regardless of host byte order: the
//! slice descriptors are byte-swapped explicitly, never read host-native.
//! All other parsing honors the byte order implied by the thin magic. The
//! load-command list is walked strictly by each command's self-reported
//! `cmdsize`; a command that lies about its size ends the walk instead of
//! derailing it.

use tracing::debug;

use super::bytes::{read_cstr, read_u16, read_u32, read_u64};
use super::BinaryExtractor;
use crate::core::arch::{cpu_type_name, ArchSlice};
use crate::core::component::{SectionInfo, SymbolInfo};
use crate::detect::{
    FAT_CIGAM, FAT_CIGAM_64, FAT_MAGIC, FAT_MAGIC_64, MH_CIGAM, MH_CIGAM_64, MH_MAGIC,
    MH_MAGIC_64,
};
use crate::error::{Result, TelcharError};

const LC_SYMTAB: u32 = 0x2;
const LC_SEGMENT: u32 = 0x1;
const LC_SEGMENT_64: u32 = 0x19;
const LC_UUID: u32 = 0x1b;
const LC_LOAD_DYLIB: u32 = 0xc;
const LC_LOAD_WEAK_DYLIB: u32 = 0x18;
const LC_REEXPORT_DYLIB: u32 = 0x1f;
const LC_LOAD_UPWARD_DYLIB: u32 = 0x23;

// nlist n_type bits
const N_STAB: u8 = 0xe0;
const N_TYPE: u8 = 0x0e;
const N_EXT: u8 = 0x01;
const N_UNDF: u8 = 0x0;
// n_desc weak bits
const N_WEAK_REF: u16 = 0x0040;
const N_WEAK_DEF: u16 = 0x0080;

const MAX_NAME: usize = 512;

/// Thin-header geometry after magic decoding.
#[derive(Clone, Copy)]
struct MachHeader {
    is_64: bool,
    le: bool,
    ncmds: u32,
    sizeofcmds: usize,
}

impl MachHeader {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 28 {
            return Err(TelcharError::MalformedBinary(
                "truncated Mach-O header".into(),
            ));
        }
        let magic_be = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let magic_le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let (is_64, le) = match (magic_le, magic_be) {
            (MH_MAGIC_64, _) => (true, true),
            (MH_MAGIC, _) => (false, true),
            (_, MH_CIGAM_64) => (true, false),
            (_, MH_CIGAM) => (false, false),
            _ => {
                return Err(TelcharError::Unsupported(
                    "not a thin Mach-O header".into(),
                ))
            }
        };
        Ok(MachHeader {
            is_64,
            le,
            ncmds: read_u32(data, 16, le).unwrap_or(0),
            sizeofcmds: read_u32(data, 20, le).unwrap_or(0) as usize,
        })
    }

    fn commands_start(&self) -> usize {
        if self.is_64 {
            32
        } else {
            28
        }
    }
}

fn is_fat_magic(data: &[u8]) -> Option<bool> {
    if data.len() < 4 {
        return None;
    }
    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    match magic {
        FAT_MAGIC | FAT_CIGAM => Some(false),
        FAT_MAGIC_64 | FAT_CIGAM_64 => Some(true),
        _ => None,
    }
}

/// Enumerate the architecture slices of a Mach-O file.
///
/// Fat containers yield one record per slice in header order with
/// explicitly byte-swapped fields; a thin file yields a single record
/// describing its own architecture.
pub fn architectures(data: &[u8]) -> Result<Vec<ArchSlice>> {
    if let Some(is_64) = is_fat_magic(data) {
        // nfat_arch immediately follows the magic, big-endian.
        let nfat = read_u32(data, 4, false).ok_or_else(|| {
            TelcharError::MalformedBinary("truncated fat header".into())
        })?;
        let entry_size = if is_64 { 32 } else { 20 };
        let mut slices = Vec::new();
        for i in 0..nfat as usize {
            let off = 8 + i * entry_size;
            let (cpu_type, cpu_subtype, slice_off, slice_size, align) = if is_64 {
                (
                    read_u32(data, off, false),
                    read_u32(data, off + 4, false),
                    read_u64(data, off + 8, false),
                    read_u64(data, off + 16, false),
                    read_u32(data, off + 24, false),
                )
            } else {
                (
                    read_u32(data, off, false),
                    read_u32(data, off + 4, false),
                    read_u32(data, off + 8, false).map(u64::from),
                    read_u32(data, off + 12, false).map(u64::from),
                    read_u32(data, off + 16, false),
                )
            };
            let (Some(cpu_type), Some(cpu_subtype), Some(offset), Some(size), Some(align)) =
                (cpu_type, cpu_subtype, slice_off, slice_size, align)
            else {
                return Err(TelcharError::MalformedBinary(
                    "truncated fat arch table".into(),
                ));
            };
            slices.push(ArchSlice {
                name: cpu_type_name(cpu_type).to_string(),
                cpu_type,
                cpu_subtype,
                offset,
                size,
                align,
            });
        }
        debug!(slices = slices.len(), "enumerated fat slices");
        return Ok(slices);
    }
    let header = MachHeader::parse(data)?;
    let cpu_type = read_u32(data, 4, header.le).unwrap_or(0);
    let cpu_subtype = read_u32(data, 8, header.le).unwrap_or(0);
    Ok(vec![ArchSlice {
        name: cpu_type_name(cpu_type).to_string(),
        cpu_type,
        cpu_subtype,
        offset: 0,
        size: data.len() as u64,
        align: 0,
    }])
}

/// Resolve the bytes to parse: the first slice of a fat container, or the
/// input itself for a thin file.
fn thin_slice(data: &[u8]) -> Result<&[u8]> {
    if is_fat_magic(data).is_none() {
        return Ok(data);
    }
    let slices = architectures(data)?;
    let first = slices.first().ok_or_else(|| {
        TelcharError::MalformedBinary("fat container with zero slices".into())
    })?;
    let start = first.offset as usize;
    let end = start.saturating_add(first.size as usize);
    if start >= data.len() || end > data.len() {
        return Err(TelcharError::MalformedBinary(
            "fat slice out of bounds".into(),
        ));
    }
    Ok(&data[start..end])
}

/// Walk load commands, calling `visit(cmd, start_offset, cmdsize)`.
///
/// The walk advances by each command's self-reported size and stops at
/// the first command that would run past the declared command area.
fn walk_load_commands<F: FnMut(u32, usize, usize)>(
    data: &[u8],
    header: &MachHeader,
    mut visit: F,
) {
    let mut off = header.commands_start();
    let lc_end = off.saturating_add(header.sizeofcmds).min(data.len());
    for _ in 0..header.ncmds {
        if off + 8 > lc_end {
            break;
        }
        let cmd = read_u32(data, off, header.le).unwrap_or(0);
        let cmdsize = read_u32(data, off + 4, header.le).unwrap_or(0) as usize;
        if cmdsize < 8 || off + cmdsize > lc_end {
            break;
        }
        visit(cmd, off, cmdsize);
        off += cmdsize;
    }
}

/// Mach-O extractor over in-memory file bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MachOExtractor;

impl BinaryExtractor for MachOExtractor {
    fn extract_symbols(&self, data: &[u8]) -> Result<Vec<SymbolInfo>> {
        let slice = thin_slice(data)?;
        let header = MachHeader::parse(slice)?;
        let section_names = section_records(slice, &header)
            .into_iter()
            .map(|s| s.name)
            .collect::<Vec<_>>();

        let mut symtab: Option<(usize, u32, usize, usize)> = None;
        walk_load_commands(slice, &header, |cmd, off, _cmdsize| {
            if cmd == LC_SYMTAB {
                let symoff = read_u32(slice, off + 8, header.le).unwrap_or(0) as usize;
                let nsyms = read_u32(slice, off + 12, header.le).unwrap_or(0);
                let stroff = read_u32(slice, off + 16, header.le).unwrap_or(0) as usize;
                let strsize = read_u32(slice, off + 20, header.le).unwrap_or(0) as usize;
                symtab = Some((symoff, nsyms, stroff, strsize));
            }
        });
        let Some((symoff, nsyms, stroff, strsize)) = symtab else {
            return Ok(Vec::new()); // parsed fine, no symbol table
        };
        let strtab_end = stroff.saturating_add(strsize).min(slice.len());
        let strtab = if stroff < slice.len() {
            &slice[stroff..strtab_end]
        } else {
            &[]
        };
        let esize = if header.is_64 { 16 } else { 12 };
        let mut symbols: Vec<SymbolInfo> = Vec::new();
        for i in 0..nsyms as usize {
            let off = symoff.saturating_add(i.saturating_mul(esize));
            if off + esize > slice.len() {
                break;
            }
            let n_strx = read_u32(slice, off, header.le).unwrap_or(0) as usize;
            let n_type = slice[off + 4];
            let n_sect = slice[off + 5];
            let n_desc = read_u16(slice, off + 6, header.le).unwrap_or(0);
            let n_value = if header.is_64 {
                read_u64(slice, off + 8, header.le).unwrap_or(0)
            } else {
                read_u32(slice, off + 8, header.le).unwrap_or(0) as u64
            };
            if n_type & N_STAB != 0 {
                continue; // debugging stab entries
            }
            if n_strx == 0 {
                continue;
            }
            let Some(name) = read_cstr(strtab, n_strx, MAX_NAME) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let is_defined = n_type & N_TYPE != N_UNDF;
            let section = if is_defined && n_sect > 0 {
                section_names
                    .get(n_sect as usize - 1)
                    .cloned()
                    .unwrap_or_default()
            } else {
                String::new()
            };
            if !symbols.iter().any(|s| s.name == name) {
                symbols.push(SymbolInfo {
                    name,
                    address: n_value,
                    size: 0, // nlist carries no size
                    is_defined,
                    is_weak: n_desc & (N_WEAK_DEF | N_WEAK_REF) != 0,
                    is_global: n_type & N_EXT != 0,
                    section,
                });
            }
        }
        Ok(symbols)
    }

    fn extract_sections(&self, data: &[u8]) -> Result<Vec<SectionInfo>> {
        let slice = thin_slice(data)?;
        let header = MachHeader::parse(slice)?;
        Ok(section_records(slice, &header))
    }

    fn extract_version(&self, data: &[u8]) -> Result<Option<String>> {
        let slice = thin_slice(data)?;
        let header = MachHeader::parse(slice)?;
        let mut version = None;
        walk_load_commands(slice, &header, |cmd, off, cmdsize| {
            if cmd == LC_UUID && cmdsize >= 24 && version.is_none() {
                if let Some(raw) = slice.get(off + 8..off + 24) {
                    let mut bytes = [0u8; 16];
                    bytes.copy_from_slice(raw);
                    version = Some(uuid::Uuid::from_bytes(bytes).to_string());
                }
            }
        });
        Ok(version)
    }

    fn extract_dependencies(&self, data: &[u8]) -> Result<Vec<String>> {
        let slice = thin_slice(data)?;
        let header = MachHeader::parse(slice)?;
        let mut deps: Vec<String> = Vec::new();
        walk_load_commands(slice, &header, |cmd, off, cmdsize| {
            if matches!(
                cmd,
                LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB | LC_LOAD_UPWARD_DYLIB
            ) {
                // dylib name offset is relative to the command start
                let name_off = read_u32(slice, off + 8, header.le).unwrap_or(0) as usize;
                if name_off >= 8 && name_off < cmdsize {
                    let start = off + name_off;
                    let max = cmdsize - name_off;
                    if let Some(path) = read_cstr(slice, start, max.min(MAX_NAME)) {
                        if !path.is_empty() && !deps.contains(&path) {
                            deps.push(path);
                        }
                    }
                }
            }
        });
        Ok(deps)
    }

    fn can_handle(&self, data: &[u8]) -> bool {
        if is_fat_magic(data).is_some() {
            return true;
        }
        MachHeader::parse(data).is_ok()
    }

    fn format_name(&self) -> &'static str {
        "Mach-O"
    }
}

/// One record per section across all segment commands, in file order.
fn section_records(slice: &[u8], header: &MachHeader) -> Vec<SectionInfo> {
    let mut sections = Vec::new();
    walk_load_commands(slice, header, |cmd, off, cmdsize| {
        let is_64 = cmd == LC_SEGMENT_64;
        if cmd != LC_SEGMENT && !is_64 {
            return;
        }
        // segment_command layout: cmd/cmdsize, segname[16], then
        // vm/file ranges and protections before nsects.
        let (first_sect, sect_size, nsects_off) = if is_64 {
            (72usize, 80usize, 64usize)
        } else {
            (56usize, 68usize, 48usize)
        };
        let segname = read_cstr(slice, off + 8, 16).unwrap_or_default();
        let nsects = read_u32(slice, off + nsects_off, header.le).unwrap_or(0) as usize;
        for i in 0..nsects {
            let s = off + first_sect + i * sect_size;
            if s + sect_size > off + cmdsize || s + sect_size > slice.len() {
                break;
            }
            let sectname = read_cstr(slice, s, 16).unwrap_or_default();
            let (addr, size, flags_off) = if is_64 {
                (
                    read_u64(slice, s + 32, header.le).unwrap_or(0),
                    read_u64(slice, s + 40, header.le).unwrap_or(0),
                    s + 64,
                )
            } else {
                (
                    read_u32(slice, s + 32, header.le).unwrap_or(0) as u64,
                    read_u32(slice, s + 36, header.le).unwrap_or(0) as u64,
                    s + 56,
                )
            };
            let flags = read_u32(slice, flags_off, header.le).unwrap_or(0) as u64;
            if !sectname.is_empty() {
                sections.push(SectionInfo {
                    name: sectname,
                    address: addr,
                    size,
                    flags,
                    section_type: segname.clone(),
                });
            }
        }
    });
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal thin 64-bit little-endian header with no load commands.
    fn thin_header64() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
        data.extend_from_slice(&(7u32 | 0x0100_0000).to_le_bytes()); // cputype x86_64
        data.extend_from_slice(&3u32.to_le_bytes()); // cpusubtype
        data.extend_from_slice(&2u32.to_le_bytes()); // MH_EXECUTE
        data.extend_from_slice(&0u32.to_le_bytes()); // ncmds
        data.extend_from_slice(&0u32.to_le_bytes()); // sizeofcmds
        data.extend_from_slice(&0u32.to_le_bytes()); // flags
        data.extend_from_slice(&0u32.to_le_bytes()); // reserved
        data
    }

    #[test]
    fn thin_file_reports_its_own_architecture() {
        let data = thin_header64();
        let slices = architectures(&data).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].name, "x86_64");
    }

    #[test]
    fn fat_header_fields_are_big_endian() {
        // Two-slice 32-bit fat header, fields written big-endian
        let mut data = Vec::new();
        data.extend_from_slice(&FAT_MAGIC.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes()); // nfat_arch
        for (cpu, off) in [(7u32 | 0x0100_0000, 0x1000u32), (12 | 0x0100_0000, 0x2000)] {
            data.extend_from_slice(&cpu.to_be_bytes());
            data.extend_from_slice(&3u32.to_be_bytes()); // cpusubtype
            data.extend_from_slice(&off.to_be_bytes());
            data.extend_from_slice(&0x800u32.to_be_bytes()); // size
            data.extend_from_slice(&14u32.to_be_bytes()); // align
        }
        let slices = architectures(&data).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].name, "x86_64");
        assert_eq!(slices[0].offset, 0x1000);
        assert_eq!(slices[0].size, 0x800);
        assert_eq!(slices[0].align, 14);
        assert_eq!(slices[1].name, "arm64");
        assert_eq!(slices[1].offset, 0x2000);
    }

    #[test]
    fn truncated_fat_table_is_malformed() {
        let mut data = Vec::new();
        data.extend_from_slice(&FAT_MAGIC.to_be_bytes());
        data.extend_from_slice(&4u32.to_be_bytes()); // claims 4 slices
        data.extend_from_slice(&[0u8; 8]); // far too short
        assert!(matches!(
            architectures(&data),
            Err(TelcharError::MalformedBinary(_))
        ));
    }

    #[test]
    fn no_symtab_is_empty_not_error() {
        let data = thin_header64();
        let symbols = MachOExtractor.extract_symbols(&data).unwrap();
        assert!(symbols.is_empty());
    }

    #[test]
    fn non_macho_is_unsupported() {
        let err = MachOExtractor.extract_symbols(&[0u8; 64]).unwrap_err();
        assert!(err.is_unsupported());
    }
}
