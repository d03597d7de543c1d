//! Debug-info decoding through the lightweight tier and the pipeline.

mod common;

use common::{build_elf64_shared_object, build_elf64_with_debug_line, write_fixture};
use telchar::dwarf::lite::LiteDwarfParser;
use telchar::dwarf::DebugInfoReader;
use telchar::{ComponentInfo, MetadataExtractor};

#[test]
fn debug_line_file_table_is_authoritative() {
    let data = build_elf64_with_debug_line(&["main.c", "util.c"]);
    let parser = LiteDwarfParser::new(&data);
    assert!(parser.has_dwarf_info());
    let files = parser.source_files().unwrap();
    assert_eq!(files, vec!["main.c".to_string(), "util.c".to_string()]);
}

#[test]
fn duplicate_file_entries_are_deduplicated() {
    let data = build_elf64_with_debug_line(&["main.c", "main.c"]);
    let parser = LiteDwarfParser::new(&data);
    assert_eq!(parser.source_files().unwrap(), vec!["main.c".to_string()]);
}

#[test]
fn binaries_without_debug_sections_have_no_dwarf() {
    let data = build_elf64_shared_object(&[("foo", 0x1000)]);
    let parser = LiteDwarfParser::new(&data);
    assert!(!parser.has_dwarf_info());
    assert!(parser.compile_units().unwrap().is_empty());
}

#[test]
fn functions_fall_back_to_the_symbol_table() {
    let data = build_elf64_shared_object(&[("alpha", 0x1000), ("beta", 0x1020)]);
    let parser = LiteDwarfParser::new(&data);
    let functions = parser.functions().unwrap();
    assert_eq!(
        functions,
        vec!["alpha".to_string(), "beta".to_string()]
    );
}

#[test]
fn pipeline_populates_source_files_and_debug_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        dir.path(),
        "app",
        &build_elf64_with_debug_line(&["main.c", "util.c"]),
    );
    let extractor = MetadataExtractor::default();
    let mut component = ComponentInfo::new("app", &path);
    assert!(extractor.extract_metadata(&mut component));
    assert!(component.contains_debug_info);
    assert!(component
        .source_files
        .contains(&"main.c".to_string()));
    assert!(component
        .source_files
        .contains(&"util.c".to_string()));
}

#[test]
fn debug_stage_can_be_disabled_by_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        dir.path(),
        "app",
        &build_elf64_with_debug_line(&["main.c"]),
    );
    let config = telchar::ExtractorConfig {
        extract_debug_info: false,
        ..telchar::ExtractorConfig::default()
    };
    let extractor = MetadataExtractor::new(config);
    let mut component = ComponentInfo::new("app", &path);
    extractor.extract_metadata(&mut component);
    assert!(component.source_files.is_empty());
}
