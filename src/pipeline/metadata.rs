//! The per-file extraction orchestrator.
//!
//! Drives one component record through detection -> extraction stages ->
//! post-processing. Only a missing file aborts a call; every other stage
//! runs regardless of earlier outcomes, each failure overwriting the
//! per-instance last-error slot (last write wins). Callers that need
//! distinguishable error reporting under concurrency use one orchestrator
//! instance per thread.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::cache::SymbolCache;
use crate::core::component::{ComponentInfo, FileType};
use crate::detect::{self, BinaryFormat};
use crate::detectors::{LicenseDetector, PackageManagerDetector, VersionDetector};
use crate::dwarf;
use crate::extract::{elf, BinaryExtractor, FormatExtractor};
use crate::io::{self, IOLimits};

const SYSTEM_LIBRARY_PREFIXES: &[&str] = &[
    "/usr/lib",
    "/usr/local/lib",
    "/lib",
    "/lib64",
    "/System/Library",
    "/opt/homebrew/lib",
];

/// Explicit orchestrator configuration, threaded in at construction
/// instead of living in process-wide mutable flags.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Gate for the (comparatively expensive) debug-info stage.
    pub extract_debug_info: bool,
    pub io_limits: IOLimits,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            extract_debug_info: true,
            io_limits: IOLimits::default(),
        }
    }
}

/// Per-file extraction orchestrator.
pub struct MetadataExtractor {
    config: ExtractorConfig,
    cache: Arc<SymbolCache>,
    last_error: Mutex<Option<String>>,
    package_manager_detector: Option<Box<dyn PackageManagerDetector>>,
    license_detector: Option<Box<dyn LicenseDetector>>,
    version_detector: Option<Box<dyn VersionDetector>>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        MetadataExtractor::new(ExtractorConfig::default())
    }
}

impl MetadataExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let cache = Arc::new(SymbolCache::with_limits(config.io_limits.clone()));
        MetadataExtractor {
            config,
            cache,
            last_error: Mutex::new(None),
            package_manager_detector: None,
            license_detector: None,
            version_detector: None,
        }
    }

    /// Share a symbol cache with other orchestrator instances.
    pub fn with_cache(config: ExtractorConfig, cache: Arc<SymbolCache>) -> Self {
        MetadataExtractor {
            cache,
            ..MetadataExtractor::new(config)
        }
    }

    pub fn set_package_manager_detector(&mut self, detector: Box<dyn PackageManagerDetector>) {
        self.package_manager_detector = Some(detector);
    }

    pub fn set_license_detector(&mut self, detector: Box<dyn LicenseDetector>) {
        self.license_detector = Some(detector);
    }

    pub fn set_version_detector(&mut self, detector: Box<dyn VersionDetector>) {
        self.version_detector = Some(detector);
    }

    pub fn cache(&self) -> &Arc<SymbolCache> {
        &self.cache
    }

    /// The most recent stage failure, if any (last write wins).
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record_error(&self, component: &mut ComponentInfo, message: impl Into<String>) {
        let message = message.into();
        debug!(path = %component.file_path.display(), %message, "extraction stage failed");
        component.set_processing_error(message.clone());
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
    }

    /// Run every extraction stage over `component` in place.
    ///
    /// Fails fast only when the file does not exist. Returns true iff at
    /// least one stage produced data; the record is marked processed
    /// either way.
    pub fn extract_metadata(&self, component: &mut ComponentInfo) -> bool {
        let path = component.file_path.clone();
        if !path.exists() {
            self.record_error(component, format!("File not found: {}", path.display()));
            return false;
        }

        let format = detect::detect_format(&path);
        let extractor = FormatExtractor::for_format(format);
        if extractor.is_none() {
            self.record_error(
                component,
                format!("No suitable extractor for: {}", path.display()),
            );
        }

        let data = match io::read_binary(&path, &self.config.io_limits) {
            Ok(data) => Some(data),
            Err(err) => {
                self.record_error(component, err.to_string());
                None
            }
        };

        let mut produced_data = false;
        if let (Some(extractor), Some(data)) = (extractor.as_ref(), data.as_ref()) {
            produced_data |= self.run_binary_stages(component, extractor, data, format);
        }

        if self.config.extract_debug_info {
            if let Some(data) = data.as_ref() {
                produced_data |= self.run_debug_stage(component, data);
            }
        }

        self.run_detectors(component);
        self.post_process(component);
        info!(
            path = %path.display(),
            %format,
            symbols = component.symbols.len(),
            sections = component.sections.len(),
            deps = component.dependencies.len(),
            produced_data,
            "extraction finished"
        );
        produced_data
    }

    fn run_binary_stages(
        &self,
        component: &mut ComponentInfo,
        extractor: &FormatExtractor,
        data: &[u8],
        format: BinaryFormat,
    ) -> bool {
        let mut produced_data = false;

        match extractor.extract_version(data) {
            Ok(Some(version)) => {
                component.version = version;
                produced_data = true;
            }
            Ok(None) => {}
            Err(err) => self.record_error(component, err.to_string()),
        }

        // Symbols go through the memoizing cache; it re-extracts on miss.
        let symbols = self.cache.get_symbols(&component.file_path);
        if symbols.is_empty() {
            // Distinguish "no symbols" from "symbol stage failed"
            if let Err(err) = extractor.extract_symbols(data) {
                self.record_error(component, err.to_string());
            }
        } else {
            for symbol in symbols {
                component.add_symbol(symbol);
            }
            produced_data = true;
        }

        match extractor.extract_sections(data) {
            Ok(sections) => {
                produced_data |= !sections.is_empty();
                for section in sections {
                    component.add_section(section);
                }
            }
            Err(err) => self.record_error(component, err.to_string()),
        }

        match extractor.extract_dependencies(data) {
            Ok(deps) => {
                produced_data |= !deps.is_empty();
                for dep in deps {
                    component.add_dependency(dep);
                }
            }
            Err(err) => self.record_error(component, err.to_string()),
        }

        if format == BinaryFormat::Elf {
            component.set_stripped(elf::is_stripped(data));
            if elf::has_debug_sections(data) {
                component.set_contains_debug_info(true);
            }
        }

        // Archive members double as source artifacts of a static library.
        if format == BinaryFormat::Archive {
            if let Ok(members) = crate::extract::archive::members(data) {
                for member in members {
                    if member.name != "/" && member.name != "//" {
                        component.add_source_file(member.name);
                    }
                }
            }
        }

        produced_data
    }

    fn run_debug_stage(&self, component: &mut ComponentInfo, data: &[u8]) -> bool {
        let debug_info = dwarf::extract_debug_info(data);
        if debug_info.is_empty() {
            return false;
        }
        let from_dwarf =
            !debug_info.source_files.is_empty() || !debug_info.compile_units.is_empty();
        for file in debug_info.source_files {
            component.add_source_file(file);
        }
        for unit in debug_info.compile_units {
            component.add_compile_unit(unit);
        }
        for function in debug_info.functions {
            component.add_function(function);
        }
        // Functions alone may have been recovered from the symbol table;
        // only DWARF-derived artifacts prove debug info is present.
        if from_dwarf {
            component.set_contains_debug_info(true);
        }
        true
    }

    fn run_detectors(&self, component: &mut ComponentInfo) {
        let Some(dir) = component.file_path.parent().map(Path::to_path_buf) else {
            return;
        };
        if let Some(detector) = &self.version_detector {
            if component.version.is_empty() {
                if let Some(best) = detector.detect(&dir).into_iter().next() {
                    component.version = best.full_version;
                }
            }
        }
        if let Some(detector) = &self.license_detector {
            if component.license.is_empty() {
                if let Some(best) = detector.detect(&dir).into_iter().next() {
                    component.license = if best.spdx_id.is_empty() {
                        best.name
                    } else {
                        best.spdx_id
                    };
                }
            }
        }
        if let Some(detector) = &self.package_manager_detector {
            if component.package_manager.is_empty() {
                if let Some(best) = detector.detect(&dir).into_iter().next() {
                    component.package_manager = best.name;
                }
            }
        }
    }

    /// Backfill identity and classification, then mark processed.
    fn post_process(&self, component: &mut ComponentInfo) {
        if component.name.is_empty() {
            if let Some(name) = component.file_path.file_name().and_then(|n| n.to_str()) {
                component.name = name.to_string();
            }
        }
        // Extension-based type only if detection left it Unknown
        if component.file_type == FileType::Unknown {
            component.refine_file_type(detect::file_type_from_extension(&component.file_path));
        }
        let path_str = component.file_path.to_string_lossy();
        if SYSTEM_LIBRARY_PREFIXES
            .iter()
            .any(|prefix| path_str.starts_with(prefix))
        {
            component.mark_system_library();
        }
        component.mark_processed();
    }

    /// Extract metadata for many paths.
    ///
    /// Paths whose extraction wholly fails are omitted from the result
    /// rather than returned as placeholders; the overall flag is true
    /// only if every path succeeded.
    pub fn extract_metadata_batched(
        &self,
        paths: &[std::path::PathBuf],
    ) -> (Vec<ComponentInfo>, bool) {
        let results = super::parallel::process(paths, |path| {
            let mut component = ComponentInfo::new(String::new(), path);
            let ok = self.extract_metadata(&mut component);
            (component, ok)
        });
        let mut components = Vec::with_capacity(results.len());
        let mut all_ok = true;
        for (component, ok) in results {
            if ok {
                components.push(component);
            } else {
                warn!(path = %component.file_path.display(), "omitting failed component");
                all_ok = false;
            }
        }
        (components, all_ok)
    }
}
