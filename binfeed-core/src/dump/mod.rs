//! Dump orchestrators.
//!
//! Three run modes over the same store:
//! - [`DumpAll`] — full dump: build calendar + registry from scratch,
//!   encode every symbol's complete history.
//! - [`DumpFix`] — backfill symbols missing from the registry without
//!   touching anything else.
//! - [`DumpUpdate`] — extend the calendar at the tail and append new
//!   rows to known symbols' binary files.
//!
//! Shared rule: the calendar phase completes before any encode starts
//! (a hard ordering barrier — encode addresses files by calendar index).
//! Per-symbol work runs on a bounded rayon pool; workers return values
//! and a single-threaded fold reduces them, so no shared mutable state
//! is written inside a parallel phase.

mod all;
mod fix;
mod update;

pub use all::DumpAll;
pub use fix::DumpFix;
pub use update::DumpUpdate;

use crate::config::DumpConfig;
use crate::error::{DumpError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Summary of a dump run.
#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    /// Symbols whose files were written or extended.
    pub symbols_processed: usize,
    /// Symbols with nothing to do (empty source table, already known in
    /// fix mode, no new rows in update mode).
    pub symbols_skipped: usize,
    /// Per-symbol failures, keyed by canonical code. Only update mode
    /// collects here; full/fix abort on the first error.
    pub errors: BTreeMap<String, String>,
    /// blake3 hash of the persisted calendar file, for change detection
    /// across runs.
    pub calendar_hash: String,
}

/// Bounded worker pool for the per-symbol phases.
pub(crate) fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| DumpError::Pool(e.to_string()))
}

/// Copy the output root to the configured backup directory before any
/// mutation. No-op when no backup is configured or the store does not
/// exist yet.
pub(crate) fn backup_output_root(config: &DumpConfig) -> Result<()> {
    let Some(backup_dir) = &config.backup_dir else {
        return Ok(());
    };
    if !config.output_root.exists() {
        return Ok(());
    }
    copy_dir_recursive(&config.output_root, backup_dir)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(DumpError::io(dst))?;
    for entry in fs::read_dir(src).map_err(DumpError::io(src))? {
        let entry = entry.map_err(DumpError::io(src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(DumpError::io(&from))?;
        }
    }
    Ok(())
}

/// Content hash of the persisted calendar file.
pub(crate) fn calendar_hash(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(DumpError::io(path))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_copies_store_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let backup = dir.path().join("backup");
        fs::create_dir_all(store.join("calendars")).unwrap();
        fs::write(store.join("calendars/day.txt"), "2020-01-01\n").unwrap();

        let mut config = DumpConfig::new(dir.path().join("src"), &store);
        config.backup_dir = Some(backup.clone());
        backup_output_root(&config).unwrap();

        assert_eq!(
            fs::read_to_string(backup.join("calendars/day.txt")).unwrap(),
            "2020-01-01\n"
        );
    }

    #[test]
    fn backup_without_store_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DumpConfig::new("/src", dir.path().join("missing"));
        config.backup_dir = Some(dir.path().join("backup"));
        backup_output_root(&config).unwrap();
        assert!(!dir.path().join("backup").exists());
    }
}
