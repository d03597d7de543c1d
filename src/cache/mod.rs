//! Memoizing symbol cache.
//!
//! Repeated links touch the same system libraries over and over; symbol
//! extraction for those is memoized per path. One mutex serializes every
//! public operation, and population happens while holding it; the miss
//! path must not re-enter `get_symbols`. Eviction is insertion-order
//! (earliest cached entry goes first), not true LRU.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::core::component::SymbolInfo;
use crate::detect;
use crate::extract::{BinaryExtractor, FormatExtractor};
use crate::io::{self, IOLimits};

/// Default maximum number of cached files.
pub const MAX_CACHE_SIZE: usize = 100;
/// Default minimum symbols a result must have to be worth caching.
pub const MIN_SYMBOLS_TO_CACHE: usize = 100;

/// Cumulative counters for one cache instance's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<PathBuf, Vec<SymbolInfo>>,
    /// Insertion order for eviction.
    order: VecDeque<PathBuf>,
    hits: u64,
    misses: u64,
}

/// Mutex-guarded per-path symbol memoizer.
pub struct SymbolCache {
    inner: Mutex<CacheInner>,
    limits: IOLimits,
    max_entries: usize,
    min_symbols: usize,
}

impl Default for SymbolCache {
    fn default() -> Self {
        SymbolCache {
            inner: Mutex::new(CacheInner::default()),
            limits: IOLimits::default(),
            max_entries: MAX_CACHE_SIZE,
            min_symbols: MIN_SYMBOLS_TO_CACHE,
        }
    }
}

impl SymbolCache {
    pub fn new() -> Self {
        SymbolCache::default()
    }

    /// A cache with explicit bounds, for callers whose workloads differ
    /// from the defaults.
    pub fn with_policy(max_entries: usize, min_symbols: usize) -> Self {
        SymbolCache {
            max_entries,
            min_symbols,
            ..SymbolCache::default()
        }
    }

    pub fn with_limits(limits: IOLimits) -> Self {
        SymbolCache {
            limits,
            ..SymbolCache::default()
        }
    }

    /// Symbols for `path`, extracted on first use and memoized when the
    /// result is cache-eligible. Extraction failures yield an empty list.
    pub fn get_symbols(&self, path: &Path) -> Vec<SymbolInfo> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(symbols) = inner.entries.get(path).cloned() {
            inner.hits += 1;
            debug!(path = %path.display(), "symbol cache hit");
            return symbols;
        }
        inner.misses += 1;
        // Population happens under the lock so concurrent callers never
        // extract the same file twice.
        let symbols = extract_symbols_uncached(path, &self.limits);
        if should_cache(path) && symbols.len() >= self.min_symbols {
            if inner.entries.len() >= self.max_entries {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                    debug!(evicted = %oldest.display(), "symbol cache full");
                }
            }
            inner.entries.insert(path.to_path_buf(), symbols.clone());
            inner.order.push_back(path.to_path_buf());
        }
        symbols
    }

    /// Whether `path` currently has a cached entry (does not count as a
    /// hit or miss).
    pub fn contains(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .contains_key(path)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn extract_symbols_uncached(path: &Path, limits: &IOLimits) -> Vec<SymbolInfo> {
    let format = detect::detect_format(path);
    let Some(extractor) = FormatExtractor::for_format(format) else {
        return Vec::new();
    };
    let Ok(data) = io::read_binary(path, limits) else {
        return Vec::new();
    };
    extractor.extract_symbols(&data).unwrap_or_default()
}

/// Cache eligibility by path shape: system libraries and shared objects
/// are worth keeping, executable-like paths are not.
fn should_cache(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    if path_str.contains("/usr/lib")
        || path_str.contains("/lib")
        || path_str.contains("libc.so")
        || path_str.contains("libstdc++")
    {
        return true;
    }
    if path_str.contains(".so") {
        return true;
    }
    // Executable-like suffixes churn between builds
    if path_str.ends_with(".exe") || path_str.ends_with(".bin") {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_policy_excludes_executable_suffixes() {
        assert!(should_cache(Path::new("/usr/lib/libc.so.6")));
        assert!(should_cache(Path::new("/opt/thing/libfoo.so")));
        assert!(should_cache(Path::new("/home/user/libbar.a")));
        assert!(!should_cache(Path::new("/home/user/app.exe")));
        assert!(!should_cache(Path::new("/home/user/app.bin")));
        // System-library prefix wins over the suffix rule
        assert!(should_cache(Path::new("/usr/lib/helper.bin")));
    }

    #[test]
    fn miss_then_stats_reflect_counters() {
        let cache = SymbolCache::new();
        let _ = cache.get_symbols(Path::new("/nonexistent/liba.so"));
        let _ = cache.get_symbols(Path::new("/nonexistent/liba.so"));
        let stats = cache.stats();
        // Both calls miss: an empty result is below the caching threshold.
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn clear_preserves_counters() {
        let cache = SymbolCache::new();
        let _ = cache.get_symbols(Path::new("/nonexistent/libb.so"));
        cache.clear();
        assert_eq!(cache.stats().misses, 1);
        assert!(cache.is_empty());
    }
}
