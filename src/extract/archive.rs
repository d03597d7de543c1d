//! Unix archive (`!<arch>`) metadata extraction.
//!
//! Walks the 60-byte member headers (members are 2-byte aligned), resolves
//! GNU long names through the `//` table, and reads best-effort symbol
//! names from the System V armap (`/`) member. Archive members double as
//! the "sections" of a static library.

use super::bytes::read_cstr;
use super::BinaryExtractor;
use crate::core::component::{SectionInfo, SymbolInfo};
use crate::error::{Result, TelcharError};

const ARCHIVE_MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_SIZE: usize = 60;

/// One archive member: resolved name plus the file range of its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// Enumerate archive members in file order.
pub fn members(data: &[u8]) -> Result<Vec<ArchiveMember>> {
    if data.len() < ARCHIVE_MAGIC.len() || &data[..ARCHIVE_MAGIC.len()] != ARCHIVE_MAGIC {
        return Err(TelcharError::Unsupported("not a Unix archive".into()));
    }
    // First pass target: the GNU long-name table, referenced as "/<offset>".
    let mut long_names: Option<(usize, usize)> = None;
    let mut result = Vec::new();
    let mut off = ARCHIVE_MAGIC.len();
    while off + HEADER_SIZE <= data.len() {
        let header = &data[off..off + HEADER_SIZE];
        if &header[58..60] != b"`\n" {
            return Err(TelcharError::MalformedBinary(format!(
                "bad archive member terminator at offset {off:#x}"
            )));
        }
        let raw_name = std::str::from_utf8(&header[..16])
            .map_err(|_| TelcharError::MalformedBinary("non-ASCII member name".into()))?
            .trim_end();
        let size: u64 = std::str::from_utf8(&header[48..58])
            .ok()
            .map(str::trim)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                TelcharError::MalformedBinary("unparsable member size".into())
            })?;
        let data_off = off + HEADER_SIZE;
        let data_end = data_off.saturating_add(size as usize);
        if data_end > data.len() {
            return Err(TelcharError::MalformedBinary(
                "archive member overruns file".into(),
            ));
        }
        if raw_name == "//" {
            long_names = Some((data_off, size as usize));
        }
        let name = resolve_name(raw_name, long_names, data);
        result.push(ArchiveMember {
            name,
            offset: data_off as u64,
            size,
        });
        // Member data is 2-byte aligned
        off = data_end + (data_end & 1);
    }
    Ok(result)
}

fn resolve_name(raw: &str, long_names: Option<(usize, usize)>, data: &[u8]) -> String {
    // The armap and long-name table keep their literal special names.
    if raw == "/" || raw == "//" {
        return raw.to_string();
    }
    // GNU: "/<offset>" points into the long-name table; entries end in "/\n".
    if let Some(index) = raw.strip_prefix('/').and_then(|r| r.parse::<usize>().ok()) {
        if let Some((table_off, table_size)) = long_names {
            if index < table_size {
                if let Some(entry) = read_cstr(data, table_off + index, table_size - index) {
                    let entry = entry.split('\n').next().unwrap_or("");
                    return entry.trim_end_matches('/').to_string();
                }
            }
        }
        return raw.to_string();
    }
    raw.trim_end_matches('/').to_string()
}

fn is_symbol_table(name: &str) -> bool {
    name.is_empty() || name == "/" || name == "__.SYMDEF" || name == "__.SYMDEF SORTED"
}

fn is_long_name_table(name: &str) -> bool {
    name == "//"
}

/// Archive extractor over in-memory file bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl BinaryExtractor for ArchiveExtractor {
    fn extract_symbols(&self, data: &[u8]) -> Result<Vec<SymbolInfo>> {
        let members = members(data)?;
        // System V armap: u32 count, count u32 member offsets, then the
        // symbol names back to back. All integers big-endian.
        let Some(armap) = members.iter().find(|m| m.name.is_empty() || m.name == "/") else {
            return Ok(Vec::new());
        };
        let base = armap.offset as usize;
        let end = base.saturating_add(armap.size as usize).min(data.len());
        let table = &data[base.min(data.len())..end];
        if table.len() < 4 {
            return Ok(Vec::new());
        }
        let count = u32::from_be_bytes([table[0], table[1], table[2], table[3]]) as usize;
        let names_off = 4 + count * 4;
        if names_off > table.len() {
            return Ok(Vec::new()); // armap lies about its count
        }
        let mut symbols: Vec<SymbolInfo> = Vec::new();
        let mut pos = names_off;
        for i in 0..count {
            let Some(name) = read_cstr(table, pos, 512) else {
                break;
            };
            if name.is_empty() {
                break;
            }
            pos += name.len() + 1;
            let member_off =
                u32::from_be_bytes([table[4 + i * 4], table[5 + i * 4], table[6 + i * 4], table[7 + i * 4]]);
            if !symbols.iter().any(|s| s.name == name) {
                symbols.push(SymbolInfo {
                    name,
                    address: member_off as u64,
                    size: 0,
                    is_defined: true,
                    is_weak: false,
                    is_global: true,
                    section: String::new(),
                });
            }
        }
        Ok(symbols)
    }

    fn extract_sections(&self, data: &[u8]) -> Result<Vec<SectionInfo>> {
        let members = members(data)?;
        Ok(members
            .into_iter()
            .filter(|m| !is_symbol_table(&m.name) && !is_long_name_table(&m.name))
            .map(|m| SectionInfo {
                name: m.name,
                address: m.offset,
                size: m.size,
                flags: 0,
                section_type: "archive_member".to_string(),
            })
            .collect())
    }

    fn extract_version(&self, data: &[u8]) -> Result<Option<String>> {
        // Archives carry no version metadata of their own.
        members(data)?;
        Ok(None)
    }

    fn extract_dependencies(&self, data: &[u8]) -> Result<Vec<String>> {
        let members = members(data)?;
        Ok(members
            .into_iter()
            .map(|m| m.name)
            .filter(|name| {
                name.contains(".so") || name.contains(".dll") || name.contains(".dylib")
            })
            .collect())
    }

    fn can_handle(&self, data: &[u8]) -> bool {
        data.len() >= ARCHIVE_MAGIC.len() && &data[..ARCHIVE_MAGIC.len()] == ARCHIVE_MAGIC
    }

    fn format_name(&self) -> &'static str {
        "Archive"
    }
}
