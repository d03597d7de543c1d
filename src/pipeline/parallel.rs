//! Parallel dispatch over input files.
//!
//! One concurrent task per file with a join barrier; results come back in
//! input order regardless of completion order. The serial mode runs the
//! identical logic without concurrency and produces identical output.
//!
//! There is deliberately no cancellation or timeout at this layer: a
//! stalled extraction blocks its task indefinitely. Per-file closures
//! must not share mutable state except through the mutex-guarded symbol
//! cache; DWARF decoder instances hold per-file parser state and are
//! never shared across tasks.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

/// Fan `per_file` out over `files`, collecting results in input order.
pub fn process<T, F>(files: &[PathBuf], per_file: F) -> Vec<T>
where
    F: Fn(&Path) -> T + Sync,
    T: Send,
{
    files.par_iter().map(|path| per_file(path)).collect()
}

/// The same operation with no concurrency, for callers that need
/// deterministic scheduling.
pub fn process_serial<T, F>(files: &[PathBuf], per_file: F) -> Vec<T>
where
    F: Fn(&Path) -> T,
{
    files.iter().map(|path| per_file(path)).collect()
}
