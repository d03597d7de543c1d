//! Binary format detection from magic bytes.
//!
//! Detection is a pure function of content: the first bytes of a file are
//! matched against the fixed magics of each supported container. The file
//! extension is only a fast-path hint for [`FileType`] classification and
//! never overrides a successful header match. Inputs shorter than the
//! needed prefix classify as `Unknown`, not as an error.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::component::FileType;
use crate::io;

/// ELF magic: 0x7F 'E' 'L' 'F'
const ELF_MAGIC: [u8; 4] = [0x7f, 0x45, 0x4c, 0x46];
/// Unix archive magic at offset 0
const ARCHIVE_MAGIC: &[u8; 7] = b"!<arch>";
/// DOS/PE magic: 'M' 'Z'
const MZ_MAGIC: [u8; 2] = [0x4d, 0x5a];

pub(crate) const MH_MAGIC: u32 = 0xfeedface;
pub(crate) const MH_CIGAM: u32 = 0xcefaedfe; // swapped
pub(crate) const MH_MAGIC_64: u32 = 0xfeedfacf;
pub(crate) const MH_CIGAM_64: u32 = 0xcffaedfe; // swapped
pub(crate) const FAT_MAGIC: u32 = 0xcafebabe; // big-endian
pub(crate) const FAT_CIGAM: u32 = 0xbebafeca; // little-endian
pub(crate) const FAT_MAGIC_64: u32 = 0xcafebabf; // big-endian 64
pub(crate) const FAT_CIGAM_64: u32 = 0xbfbafeca; // little-endian 64

/// Supported binary container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryFormat {
    Elf,
    MachO,
    Pe,
    Archive,
    Unknown,
}

impl std::fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BinaryFormat::Elf => "ELF",
            BinaryFormat::MachO => "Mach-O",
            BinaryFormat::Pe => "PE",
            BinaryFormat::Archive => "Archive",
            BinaryFormat::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Classify a byte prefix by its magic.
pub fn detect_format_bytes(data: &[u8]) -> BinaryFormat {
    if data.len() >= ARCHIVE_MAGIC.len() && &data[..ARCHIVE_MAGIC.len()] == ARCHIVE_MAGIC {
        return BinaryFormat::Archive;
    }
    if data.len() >= 4 {
        if data[..4] == ELF_MAGIC {
            return BinaryFormat::Elf;
        }
        let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if matches!(
            magic,
            MH_MAGIC
                | MH_CIGAM
                | MH_MAGIC_64
                | MH_CIGAM_64
                | FAT_MAGIC
                | FAT_CIGAM
                | FAT_MAGIC_64
                | FAT_CIGAM_64
        ) {
            return BinaryFormat::MachO;
        }
    }
    if data.len() >= 2 && data[..2] == MZ_MAGIC {
        return BinaryFormat::Pe;
    }
    BinaryFormat::Unknown
}

/// Classify a file on disk by reading its magic prefix.
///
/// Unreadable or too-short files classify as `Unknown`.
pub fn detect_format(path: &Path) -> BinaryFormat {
    match io::read_prefix(path, io::MAX_SNIFF_SIZE) {
        Ok(prefix) => {
            let format = detect_format_bytes(&prefix);
            debug!(path = %path.display(), %format, "detected format");
            format
        }
        Err(_) => BinaryFormat::Unknown,
    }
}

static EXTENSION_TYPES: Lazy<HashMap<&'static str, FileType>> = Lazy::new(|| {
    [
        ("o", FileType::Object),
        ("obj", FileType::Object),
        ("a", FileType::StaticLibrary),
        ("lib", FileType::StaticLibrary),
        ("so", FileType::SharedLibrary),
        ("dylib", FileType::SharedLibrary),
        ("dll", FileType::SharedLibrary),
        ("exe", FileType::Executable),
        ("c", FileType::Source),
        ("cc", FileType::Source),
        ("cpp", FileType::Source),
        ("cxx", FileType::Source),
        ("h", FileType::Source),
        ("hpp", FileType::Source),
        ("rs", FileType::Source),
        ("m", FileType::Source),
        ("mm", FileType::Source),
    ]
    .into_iter()
    .collect()
});

/// Best-effort [`FileType`] from a file extension alone.
pub fn file_type_from_extension(path: &Path) -> FileType {
    let base = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    // Versioned shared objects: libfoo.so.1.2.3
    if base.contains(".so.") {
        return FileType::SharedLibrary;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| EXTENSION_TYPES.get(e.as_str()).copied())
        .unwrap_or(FileType::Unknown)
}

/// Classify a file from its header, falling back to the extension hint.
///
/// The header always wins when it matches; the extension only decides for
/// files whose content is not a recognized container (sources, unknowns).
pub fn classify_file_type(path: &Path, data: &[u8]) -> FileType {
    match detect_format_bytes(data) {
        BinaryFormat::Elf => elf_file_type(data),
        BinaryFormat::MachO => macho_file_type(path, data),
        BinaryFormat::Pe => pe_file_type(data),
        BinaryFormat::Archive => FileType::StaticLibrary,
        BinaryFormat::Unknown => file_type_from_extension(path),
    }
}

fn elf_file_type(data: &[u8]) -> FileType {
    // e_type at offset 16, endianness from EI_DATA
    if data.len() < 18 {
        return FileType::Unknown;
    }
    let le = data[5] != 2;
    let e_type = if le {
        u16::from_le_bytes([data[16], data[17]])
    } else {
        u16::from_be_bytes([data[16], data[17]])
    };
    match e_type {
        1 => FileType::Object,        // ET_REL
        2 => FileType::Executable,    // ET_EXEC
        3 => FileType::SharedLibrary, // ET_DYN
        _ => FileType::Unknown,
    }
}

fn macho_file_type(path: &Path, data: &[u8]) -> FileType {
    if data.len() < 16 {
        return FileType::Unknown;
    }
    let magic_be = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if matches!(
        magic_be,
        FAT_MAGIC | FAT_CIGAM | FAT_MAGIC_64 | FAT_CIGAM_64
    ) {
        // Classifying a fat container means classifying a slice we have not
        // unwrapped yet; lean on the extension, defaulting to executable.
        let hint = file_type_from_extension(path);
        return if hint == FileType::Unknown {
            FileType::Executable
        } else {
            hint
        };
    }
    let magic_le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let le = matches!(magic_le, MH_MAGIC | MH_MAGIC_64);
    let filetype = if le {
        u32::from_le_bytes([data[12], data[13], data[14], data[15]])
    } else {
        u32::from_be_bytes([data[12], data[13], data[14], data[15]])
    };
    match filetype {
        0x1 => FileType::Object,        // MH_OBJECT
        0x2 => FileType::Executable,    // MH_EXECUTE
        0x6 => FileType::SharedLibrary, // MH_DYLIB
        0x8 => FileType::SharedLibrary, // MH_BUNDLE
        _ => FileType::Unknown,
    }
}

fn pe_file_type(data: &[u8]) -> FileType {
    // e_lfanew at 0x3c, COFF characteristics at PE+22
    if data.len() < 0x40 {
        return FileType::Executable;
    }
    let e_lfanew =
        u32::from_le_bytes([data[0x3c], data[0x3d], data[0x3e], data[0x3f]]) as usize;
    let characteristics_off = e_lfanew + 22;
    if let Some(b) = data.get(characteristics_off..characteristics_off + 2) {
        let characteristics = u16::from_le_bytes([b[0], b[1]]);
        if characteristics & 0x2000 != 0 {
            // IMAGE_FILE_DLL
            return FileType::SharedLibrary;
        }
    }
    FileType::Executable
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn elf_magic_detects() {
        assert_eq!(
            detect_format_bytes(b"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00"),
            BinaryFormat::Elf
        );
    }

    #[test]
    fn all_macho_magics_detect() {
        for magic in [
            0xfeedfaceu32,
            0xcefaedfe,
            0xfeedfacf,
            0xcffaedfe,
            0xcafebabe,
            0xbebafeca,
            0xcafebabf,
            0xbfbafeca,
        ] {
            let mut data = magic.to_be_bytes().to_vec();
            data.extend_from_slice(&[0u8; 12]);
            assert_eq!(
                detect_format_bytes(&data),
                BinaryFormat::MachO,
                "magic {magic:#x}"
            );
        }
    }

    #[test]
    fn pe_and_archive_magics_detect() {
        assert_eq!(
            detect_format_bytes(b"MZ\x90\x00\x03\x00\x00\x00"),
            BinaryFormat::Pe
        );
        assert_eq!(detect_format_bytes(b"!<arch>\n"), BinaryFormat::Archive);
    }

    #[test]
    fn short_inputs_are_unknown_not_errors() {
        assert_eq!(detect_format_bytes(&[]), BinaryFormat::Unknown);
        assert_eq!(detect_format_bytes(b"\x7fEL"), BinaryFormat::Unknown);
        assert_eq!(detect_format_bytes(b"M"), BinaryFormat::Unknown);
        assert_eq!(detect_format_bytes(b"!<arch"), BinaryFormat::Unknown);
    }

    #[test]
    fn extension_never_overrides_header() {
        // ELF bytes behind a .dll name still classify as ELF shared object
        let mut data = b"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        data.extend_from_slice(&3u16.to_le_bytes()); // ET_DYN
        let ft = classify_file_type(&PathBuf::from("fake.dll"), &data);
        assert_eq!(ft, FileType::SharedLibrary);
        assert_eq!(detect_format_bytes(&data), BinaryFormat::Elf);
    }

    #[test]
    fn extension_hint_used_for_unrecognized_content() {
        assert_eq!(
            classify_file_type(&PathBuf::from("main.c"), b"int main"),
            FileType::Source
        );
        assert_eq!(
            classify_file_type(&PathBuf::from("libx.so.1.2"), b"junk"),
            FileType::SharedLibrary
        );
        assert_eq!(
            classify_file_type(&PathBuf::from("data.blob"), b"junk"),
            FileType::Unknown
        );
    }

    #[test]
    fn elf_e_type_maps_to_file_type() {
        let mut data = b"\x7fELF\x02\x01\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        data.extend_from_slice(&1u16.to_le_bytes()); // ET_REL
        assert_eq!(
            classify_file_type(&PathBuf::from("x.bin"), &data),
            FileType::Object
        );
    }
}
