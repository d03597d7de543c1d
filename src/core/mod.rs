//! Core data types for the extraction engine.

pub mod arch;
pub mod component;

pub use arch::ArchSlice;
pub use component::{ComponentInfo, FileType, LinkerType, SectionInfo, SymbolInfo};
