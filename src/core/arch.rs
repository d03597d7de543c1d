//! Architecture-slice records for Mach-O fat (universal) binaries.

use serde::{Deserialize, Serialize};

/// One per-architecture slice of a fat binary, in fat-header order.
///
/// Offsets, sizes and alignment come from the fat header, which is always
/// big-endian regardless of host byte order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchSlice {
    /// Human-readable CPU name ("x86_64", "arm64", ...).
    pub name: String,
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    /// File offset of the slice within the fat container.
    pub offset: u64,
    pub size: u64,
    /// Alignment as a power of two.
    pub align: u32,
}

// CPU_TYPE_* constants from <mach/machine.h>; the 64-bit variants set
// CPU_ARCH_ABI64 (0x0100_0000).
const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_X86_64: u32 = 7 | 0x0100_0000;
const CPU_TYPE_ARM: u32 = 12;
const CPU_TYPE_ARM64: u32 = 12 | 0x0100_0000;
const CPU_TYPE_POWERPC: u32 = 18;
const CPU_TYPE_POWERPC64: u32 = 18 | 0x0100_0000;

/// Map a Mach-O CPU type to its conventional name.
pub fn cpu_type_name(cpu_type: u32) -> &'static str {
    match cpu_type {
        CPU_TYPE_X86 => "i386",
        CPU_TYPE_X86_64 => "x86_64",
        CPU_TYPE_ARM => "arm",
        CPU_TYPE_ARM64 => "arm64",
        CPU_TYPE_POWERPC => "ppc",
        CPU_TYPE_POWERPC64 => "ppc64",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_cpu_types_have_names() {
        assert_eq!(cpu_type_name(CPU_TYPE_X86_64), "x86_64");
        assert_eq!(cpu_type_name(CPU_TYPE_ARM64), "arm64");
        assert_eq!(cpu_type_name(0xdead), "unknown");
    }
}
