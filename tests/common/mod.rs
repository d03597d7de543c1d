//! Common test utilities: synthetic binary builders and fixture helpers.
//!
//! Integration tests assemble minimal-but-valid ELF, Mach-O and archive
//! images byte by byte so they exercise the real parsers without shipping
//! binary fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Specification of one section for the synthetic ELF builder.
pub struct SectionSpec {
    pub name: &'static str,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    /// Index into the final section table (null header counts as 0).
    pub link: u32,
    pub entsize: u64,
    pub data: Vec<u8>,
}

impl SectionSpec {
    pub fn new(name: &'static str, sh_type: u32, data: Vec<u8>) -> Self {
        SectionSpec {
            name,
            sh_type,
            flags: 0,
            addr: 0,
            link: 0,
            entsize: 0,
            data,
        }
    }
}

fn shdr64(
    name_off: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    entsize: u64,
) -> [u8; 64] {
    let mut shdr = [0u8; 64];
    shdr[0..4].copy_from_slice(&name_off.to_le_bytes());
    shdr[4..8].copy_from_slice(&sh_type.to_le_bytes());
    shdr[8..16].copy_from_slice(&flags.to_le_bytes());
    shdr[16..24].copy_from_slice(&addr.to_le_bytes());
    shdr[24..32].copy_from_slice(&offset.to_le_bytes());
    shdr[32..40].copy_from_slice(&size.to_le_bytes());
    shdr[40..44].copy_from_slice(&link.to_le_bytes());
    shdr[56..64].copy_from_slice(&entsize.to_le_bytes());
    shdr
}

/// Assemble a 64-bit little-endian ELF with the given sections plus an
/// auto-generated `.shstrtab`.
pub fn build_elf64(e_type: u16, specs: &[SectionSpec]) -> Vec<u8> {
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for spec in specs {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(spec.name.as_bytes());
        shstrtab.push(0);
    }
    let shstr_name_off = shstrtab.len() as u32;
    shstrtab.extend_from_slice(b".shstrtab");
    shstrtab.push(0);

    let mut out = vec![0u8; 64]; // ELF header placeholder
    let mut offsets = Vec::new();
    for spec in specs {
        offsets.push(out.len());
        out.extend_from_slice(&spec.data);
    }
    let shstr_off = out.len();
    out.extend_from_slice(&shstrtab);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    let shoff = out.len();
    let shnum = specs.len() + 2; // null + specs + shstrtab
    out.extend_from_slice(&[0u8; 64]); // null section header
    for (i, spec) in specs.iter().enumerate() {
        out.extend_from_slice(&shdr64(
            name_offsets[i],
            spec.sh_type,
            spec.flags,
            spec.addr,
            offsets[i] as u64,
            spec.data.len() as u64,
            spec.link,
            spec.entsize,
        ));
    }
    out.extend_from_slice(&shdr64(
        shstr_name_off,
        3, // SHT_STRTAB
        0,
        0,
        shstr_off as u64,
        shstrtab.len() as u64,
        0,
        0,
    ));

    out[0..4].copy_from_slice(b"\x7fELF");
    out[4] = 2; // ELFCLASS64
    out[5] = 1; // little-endian
    out[6] = 1; // EV_CURRENT
    out[16..18].copy_from_slice(&e_type.to_le_bytes());
    out[18..20].copy_from_slice(&0x3eu16.to_le_bytes()); // EM_X86_64
    out[20..24].copy_from_slice(&1u32.to_le_bytes());
    out[40..48].copy_from_slice(&(shoff as u64).to_le_bytes());
    out[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
    out[58..60].copy_from_slice(&64u16.to_le_bytes()); // e_shentsize
    out[60..62].copy_from_slice(&(shnum as u16).to_le_bytes());
    out[62..64].copy_from_slice(&((shnum - 1) as u16).to_le_bytes()); // shstrndx
    out
}

fn sym64(name_off: u32, info: u8, shndx: u16, value: u64, size: u64) -> [u8; 24] {
    let mut sym = [0u8; 24];
    sym[0..4].copy_from_slice(&name_off.to_le_bytes());
    sym[4] = info;
    sym[6..8].copy_from_slice(&shndx.to_le_bytes());
    sym[8..16].copy_from_slice(&value.to_le_bytes());
    sym[16..24].copy_from_slice(&size.to_le_bytes());
    sym
}

/// A 64-bit LE ELF shared object exporting global symbols from `.text`.
///
/// Section table: null, `.text`, `.symtab`, `.strtab`, `.shstrtab`.
pub fn build_elf64_shared_object(symbols: &[(&str, u64)]) -> Vec<u8> {
    let mut strtab = vec![0u8];
    let mut symtab = sym64(0, 0, 0, 0, 0).to_vec(); // null symbol
    for (name, addr) in symbols {
        let name_off = strtab.len() as u32;
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
        // STB_GLOBAL << 4 | STT_FUNC, defined in section 1 (.text)
        symtab.extend_from_slice(&sym64(name_off, 0x12, 1, *addr, 0x20));
    }
    build_elf64(
        3, // ET_DYN
        &[
            SectionSpec {
                name: ".text",
                sh_type: 1, // SHT_PROGBITS
                flags: 0x6, // ALLOC | EXECINSTR
                addr: 0x1000,
                link: 0,
                entsize: 0,
                data: vec![0xc3; 16],
            },
            SectionSpec {
                name: ".symtab",
                sh_type: 2, // SHT_SYMTAB
                flags: 0,
                addr: 0,
                link: 3, // .strtab
                entsize: 24,
                data: symtab,
            },
            SectionSpec::new(".strtab", 3, strtab),
        ],
    )
}

/// A minimal DWARF v2 line program listing the given file names.
pub fn build_debug_line(files: &[&str]) -> Vec<u8> {
    let mut header_tail = Vec::new();
    header_tail.push(1); // minimum_instruction_length
    header_tail.push(1); // default_is_stmt
    header_tail.push(0xfb); // line_base (-5)
    header_tail.push(14); // line_range
    header_tail.push(13); // opcode_base
    header_tail.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    header_tail.push(0); // empty include_directories
    for file in files {
        header_tail.extend_from_slice(file.as_bytes());
        header_tail.push(0);
        header_tail.extend_from_slice(&[0, 0, 0]); // dir index, mtime, length
    }
    header_tail.push(0); // end of file table

    let mut body = Vec::new();
    body.extend_from_slice(&2u16.to_le_bytes()); // version
    body.extend_from_slice(&(header_tail.len() as u32).to_le_bytes());
    body.extend_from_slice(&header_tail);

    let mut section = Vec::new();
    section.extend_from_slice(&(body.len() as u32).to_le_bytes());
    section.extend_from_slice(&body);
    section
}

/// An ELF carrying only a handcrafted `.debug_line` section.
pub fn build_elf64_with_debug_line(files: &[&str]) -> Vec<u8> {
    build_elf64(
        2, // ET_EXEC
        &[
            SectionSpec {
                name: ".text",
                sh_type: 1,
                flags: 0x6,
                addr: 0x1000,
                link: 0,
                entsize: 0,
                data: vec![0xc3; 8],
            },
            SectionSpec::new(".debug_line", 1, build_debug_line(files)),
        ],
    )
}

const MH_MAGIC_64: u32 = 0xfeedfacf;
const LC_LOAD_DYLIB: u32 = 0xc;
const LC_UUID: u32 = 0x1b;

/// A thin 64-bit little-endian Mach-O executable with one
/// dynamic-library-load command (and optionally an LC_UUID command).
pub fn build_thin_macho64(dylib: &str, uuid: Option<[u8; 16]>) -> Vec<u8> {
    let mut commands = Vec::new();

    let path_bytes = dylib.len() + 1;
    let mut cmdsize = 24 + path_bytes;
    cmdsize += (8 - cmdsize % 8) % 8; // 8-byte alignment
    let mut dylib_cmd = Vec::with_capacity(cmdsize);
    dylib_cmd.extend_from_slice(&LC_LOAD_DYLIB.to_le_bytes());
    dylib_cmd.extend_from_slice(&(cmdsize as u32).to_le_bytes());
    dylib_cmd.extend_from_slice(&24u32.to_le_bytes()); // name offset
    dylib_cmd.extend_from_slice(&0u32.to_le_bytes()); // timestamp
    dylib_cmd.extend_from_slice(&0x0001_0000u32.to_le_bytes()); // current_version
    dylib_cmd.extend_from_slice(&0x0001_0000u32.to_le_bytes()); // compatibility_version
    dylib_cmd.extend_from_slice(dylib.as_bytes());
    dylib_cmd.resize(cmdsize, 0);
    commands.extend_from_slice(&dylib_cmd);

    let mut ncmds = 1u32;
    if let Some(uuid) = uuid {
        commands.extend_from_slice(&LC_UUID.to_le_bytes());
        commands.extend_from_slice(&24u32.to_le_bytes());
        commands.extend_from_slice(&uuid);
        ncmds += 1;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
    out.extend_from_slice(&(7u32 | 0x0100_0000).to_le_bytes()); // CPU_TYPE_X86_64
    out.extend_from_slice(&3u32.to_le_bytes()); // cpusubtype
    out.extend_from_slice(&2u32.to_le_bytes()); // MH_EXECUTE
    out.extend_from_slice(&ncmds.to_le_bytes());
    out.extend_from_slice(&(commands.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // flags
    out.extend_from_slice(&0u32.to_le_bytes()); // reserved
    out.extend_from_slice(&commands);
    out
}

/// A 32-bit fat container embedding one thin slice at offset 0x100.
///
/// Fat header fields are written big-endian, as on disk.
pub fn build_fat_macho(thin: &[u8]) -> Vec<u8> {
    let slice_offset = 0x100usize;
    let mut out = Vec::new();
    out.extend_from_slice(&0xcafebabeu32.to_be_bytes()); // FAT_MAGIC
    out.extend_from_slice(&1u32.to_be_bytes()); // nfat_arch
    out.extend_from_slice(&(7u32 | 0x0100_0000).to_be_bytes()); // cputype
    out.extend_from_slice(&3u32.to_be_bytes()); // cpusubtype
    out.extend_from_slice(&(slice_offset as u32).to_be_bytes());
    out.extend_from_slice(&(thin.len() as u32).to_be_bytes());
    out.extend_from_slice(&8u32.to_be_bytes()); // align (2^8)
    out.resize(slice_offset, 0);
    out.extend_from_slice(thin);
    out
}

/// A Unix archive from (member name, content) pairs.
pub fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = b"!<arch>\n".to_vec();
    for (name, content) in entries {
        let mut header = vec![b' '; 60];
        header[..name.len()].copy_from_slice(name.as_bytes());
        let size = content.len().to_string();
        header[48..48 + size.len()].copy_from_slice(size.as_bytes());
        header[58] = b'`';
        header[59] = b'\n';
        out.extend_from_slice(&header);
        out.extend_from_slice(content);
        if content.len() % 2 == 1 {
            out.push(b'\n');
        }
    }
    out
}

/// Write `bytes` into `dir` under `name` and return the full path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}
