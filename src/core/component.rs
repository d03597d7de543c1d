//! The per-file component record accumulated by the extraction pipeline.
//!
//! One `ComponentInfo` is created when a file is first observed, mutated in
//! place by each extraction stage, and handed whole to the external SBOM
//! serializer at the end of a run. Collections are insertion-ordered and
//! deduplicated by logical key, so repeated extraction passes over an
//! unmodified file are idempotent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Classification of an input file.
///
/// Set once at construction from a header sniff plus extension hint; later
/// stages may upgrade `Unknown` to a concrete type but never downgrade a
/// confident detection back to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileType {
    #[default]
    Unknown,
    /// Relocatable object file (.o, .obj)
    Object,
    /// Static library (.a, .lib)
    StaticLibrary,
    /// Shared library (.so, .dylib, .dll)
    SharedLibrary,
    Executable,
    /// Source file (.c, .cpp, .rs, ...)
    Source,
}

/// Which linker plugin discovered a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkerType {
    Lld,
    Gold,
    Bfd,
    #[default]
    Unknown,
}

/// One symbol extracted from a binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub is_defined: bool,
    pub is_weak: bool,
    pub is_global: bool,
    /// Name of the section containing the symbol, empty if unresolved.
    pub section: String,
}

/// One section (or archive member) of a binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub flags: u64,
    pub section_type: String,
}

/// The accumulator record for one discovered binary artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    pub file_path: PathBuf,
    pub version: String,
    pub supplier: String,
    pub license: String,
    pub package_manager: String,
    /// SHA-256 of the file content as it existed at construction time.
    pub checksum: String,
    pub file_type: FileType,
    pub file_size: u64,

    pub symbols: Vec<SymbolInfo>,
    pub sections: Vec<SectionInfo>,
    pub dependencies: Vec<String>,
    pub source_files: Vec<String>,
    pub functions: Vec<String>,
    pub compile_units: Vec<String>,

    pub was_processed: bool,
    pub processing_error: Option<String>,
    pub detected_by: LinkerType,

    pub is_system_library: bool,
    pub contains_debug_info: bool,
    pub is_stripped: bool,
}

impl ComponentInfo {
    /// Create a record for `path`, classifying it and hashing its content.
    ///
    /// The checksum and size are captured exactly once, here; the record
    /// remains constructible for paths that do not exist yet (checksum
    /// stays empty and the type `Unknown`).
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut component = ComponentInfo {
            name: name.into(),
            file_path: path.to_path_buf(),
            ..ComponentInfo::default()
        };
        if let Ok(data) = std::fs::read(path) {
            component.file_size = data.len() as u64;
            component.checksum = crate::hashing::sha256_digest(&data);
            component.file_type = crate::detect::classify_file_type(path, &data);
        }
        component
    }

    /// Add a symbol unless one with the same name is already present.
    pub fn add_symbol(&mut self, symbol: SymbolInfo) {
        if !self.symbols.iter().any(|s| s.name == symbol.name) {
            self.symbols.push(symbol);
        }
    }

    /// Add a section unless one with the same name is already present.
    pub fn add_section(&mut self, section: SectionInfo) {
        if !self.sections.iter().any(|s| s.name == section.name) {
            self.sections.push(section);
        }
    }

    pub fn add_dependency(&mut self, dependency: impl Into<String>) {
        let dependency = dependency.into();
        if !dependency.is_empty() && !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }

    pub fn add_source_file(&mut self, source_file: impl Into<String>) {
        let source_file = source_file.into();
        if !source_file.is_empty() && !self.source_files.contains(&source_file) {
            self.source_files.push(source_file);
        }
    }

    pub fn add_function(&mut self, function: impl Into<String>) {
        let function = function.into();
        if !function.is_empty() && !self.functions.contains(&function) {
            self.functions.push(function);
        }
    }

    pub fn add_compile_unit(&mut self, unit: impl Into<String>) {
        let unit = unit.into();
        if !unit.is_empty() && !self.compile_units.contains(&unit) {
            self.compile_units.push(unit);
        }
    }

    /// Upgrade the file type if it is still `Unknown`.
    ///
    /// A confident detection is never overwritten, and `Unknown` is never
    /// written over a concrete type.
    pub fn refine_file_type(&mut self, file_type: FileType) {
        if self.file_type == FileType::Unknown && file_type != FileType::Unknown {
            self.file_type = file_type;
        }
    }

    pub fn mark_processed(&mut self) {
        self.was_processed = true;
    }

    /// Record a stage failure. Last write wins; this is a single slot, not
    /// an error list.
    pub fn set_processing_error(&mut self, error: impl Into<String>) {
        self.processing_error = Some(error.into());
    }

    pub fn set_detected_by(&mut self, linker: LinkerType) {
        self.detected_by = linker;
    }

    pub fn mark_system_library(&mut self) {
        self.is_system_library = true;
    }

    pub fn set_contains_debug_info(&mut self, has_debug: bool) {
        self.contains_debug_info = has_debug;
    }

    pub fn set_stripped(&mut self, stripped: bool) {
        self.is_stripped = stripped;
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.name == name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// Serialize the record for the external SBOM serializer.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
