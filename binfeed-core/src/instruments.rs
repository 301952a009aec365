//! Instrument registry — per-symbol (start, end) date-range index.
//!
//! Serialized as tab-separated `SYMBOL\tSTART\tEND`, one row per symbol,
//! sorted by symbol (the BTreeMap gives reproducible output for free).
//! Entries are upserted, never deleted, across fix/update runs.

use crate::config::{Freq, INSTRUMENTS_SEP};
use crate::error::{DumpError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Earliest and latest dates a symbol has data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> DateRange {
        debug_assert!(start <= end, "DateRange start must not exceed end");
        DateRange { start, end }
    }
}

/// The registry: canonical uppercase symbol → date range.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    entries: BTreeMap<String, DateRange>,
}

impl InstrumentRegistry {
    pub fn new() -> InstrumentRegistry {
        InstrumentRegistry::default()
    }

    /// Load `instruments/all.txt`; missing file is `NotFound` so fix and
    /// update runs fail fast without a prior full dump.
    pub fn load(path: &Path, freq: Freq) -> Result<InstrumentRegistry> {
        if !path.exists() {
            return Err(DumpError::NotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(INSTRUMENTS_SEP as u8)
            .has_headers(false)
            .from_path(path)
            .map_err(|e| DumpError::Format(format!("instruments {}: {e}", path.display())))?;

        let mut entries = BTreeMap::new();
        for record in reader.records() {
            let record = record
                .map_err(|e| DumpError::Format(format!("instruments {}: {e}", path.display())))?;
            let (Some(symbol), Some(start), Some(end)) =
                (record.get(0), record.get(1), record.get(2))
            else {
                return Err(DumpError::Format(format!(
                    "bad instruments row {:?} in {}",
                    record,
                    path.display()
                )));
            };
            let (Some(start), Some(end)) = (freq.parse(start), freq.parse(end)) else {
                return Err(DumpError::Format(format!(
                    "bad instruments dates for '{symbol}' in {}",
                    path.display()
                )));
            };
            entries.insert(symbol.trim().to_uppercase(), DateRange::new(start, end));
        }
        Ok(InstrumentRegistry { entries })
    }

    /// Atomic whole-file rewrite, rows sorted by symbol.
    pub fn save(&self, path: &Path, freq: Freq) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(DumpError::io(parent))?;
        }
        let tmp = path.with_extension("txt.tmp");
        {
            let file = fs::File::create(&tmp).map_err(DumpError::io(&tmp))?;
            let mut writer = csv::WriterBuilder::new()
                .delimiter(INSTRUMENTS_SEP as u8)
                .has_headers(false)
                .from_writer(file);
            for (symbol, range) in &self.entries {
                writer
                    .write_record([
                        symbol.as_str(),
                        &freq.format(range.start),
                        &freq.format(range.end),
                    ])
                    .map_err(|e| DumpError::Format(format!("instruments write: {e}")))?;
            }
            writer
                .flush()
                .map_err(|e| DumpError::Format(format!("instruments write: {e}")))?;
        }
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DumpError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<DateRange> {
        self.entries.get(symbol).copied()
    }

    /// Full-dump policy: overwrite unconditionally from freshly computed
    /// full-history ranges.
    pub fn insert(&mut self, symbol: impl Into<String>, range: DateRange) {
        self.entries.insert(symbol.into(), range);
    }

    /// Fix-mode policy: insert only if the symbol is unknown. Returns
    /// whether an entry was added.
    pub fn insert_if_absent(&mut self, symbol: impl Into<String>, range: DateRange) -> bool {
        let symbol = symbol.into();
        if self.entries.contains_key(&symbol) {
            return false;
        }
        self.entries.insert(symbol, range);
        true
    }

    /// Update-mode policy: advance `end` forward for a known symbol,
    /// leaving `start` untouched. Returns whether the entry changed.
    pub fn advance_end(&mut self, symbol: &str, new_end: NaiveDateTime) -> bool {
        match self.entries.get_mut(symbol) {
            Some(range) if new_end > range.end => {
                range.end = new_end;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DateRange)> {
        self.entries.iter()
    }
}
