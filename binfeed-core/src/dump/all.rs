//! Full dump: rebuild the entire store from source.

use super::{backup_output_root, build_pool, calendar_hash, DumpReport};
use crate::calendar::Calendar;
use crate::config::DumpConfig;
use crate::encoder;
use crate::error::Result;
use crate::instruments::{DateRange, InstrumentRegistry};
use crate::progress::DumpProgress;
use crate::source::{SourceInput, SourceSet};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Full dump orchestrator.
///
/// Phases: collect dates (parallel) → build calendar → build registry →
/// encode every symbol's full history (parallel). Any error is fatal.
pub struct DumpAll<'a> {
    config: &'a DumpConfig,
    progress: &'a dyn DumpProgress,
}

/// Per-symbol result of the date-collection phase.
struct DateScan {
    code: String,
    dates: BTreeSet<NaiveDateTime>,
    range: Option<DateRange>,
}

impl<'a> DumpAll<'a> {
    pub fn new(config: &'a DumpConfig, progress: &'a dyn DumpProgress) -> Self {
        Self { config, progress }
    }

    pub fn dump(&self) -> Result<DumpReport> {
        backup_output_root(self.config)?;
        let sources = SourceSet::discover(self.config)?;
        let pool = build_pool(self.config.max_workers)?;

        // Phase 1: each worker returns its local date set; the union is
        // folded single-threaded below.
        self.progress
            .on_phase_start("date collection", sources.inputs.len());
        let scans: Vec<Result<DateScan>> = pool.install(|| {
            sources
                .inputs
                .par_iter()
                .map(|input| self.scan_dates(input))
                .collect()
        });

        let mut all_dates = BTreeSet::new();
        let mut registry = InstrumentRegistry::new();
        for scan in scans {
            let scan = scan?;
            all_dates.extend(scan.dates);
            if let Some(range) = scan.range {
                registry.insert(scan.code, range);
            }
        }

        let calendar = Calendar::build(self.config.freq, all_dates);
        calendar.save(&self.config.calendar_path())?;
        registry.save(&self.config.instruments_path(), self.config.freq)?;

        // Phase 2: encode, strictly after the calendar is on disk.
        self.progress
            .on_phase_start("feature dump", sources.inputs.len());
        let results: Vec<Result<bool>> = pool.install(|| {
            sources
                .inputs
                .par_iter()
                .map(|input| {
                    let result = self.encode_one(input, &calendar);
                    self.progress.on_symbol_done(input.code(), result.as_ref().err());
                    result
                })
                .collect()
        });
        let mut processed = 0;
        let mut skipped = 0;
        for result in results {
            if result? {
                processed += 1;
            } else {
                skipped += 1;
            }
        }

        let report = DumpReport {
            symbols_processed: processed,
            symbols_skipped: skipped,
            errors: BTreeMap::new(),
            calendar_hash: calendar_hash(&self.config.calendar_path())?,
        };
        self.progress.on_run_complete(processed, skipped, 0);
        Ok(report)
    }

    fn scan_dates(&self, input: &SourceInput) -> Result<DateScan> {
        let table = input.load(self.config)?;
        let range = match (table.min_date(), table.max_date()) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            _ => None,
        };
        Ok(DateScan {
            code: table.symbol,
            dates: table.dates.into_iter().collect(),
            range,
        })
    }

    /// Returns whether the symbol actually got feature files (an empty
    /// table is warn-skipped by the encoder, not an error).
    fn encode_one(&self, input: &SourceInput, calendar: &Calendar) -> Result<bool> {
        let table = input.load(self.config)?;
        let encoded = !table.is_empty();
        encoder::encode_full(
            &table,
            calendar,
            &self.config.symbol_features_dir(&table.symbol),
            &self.config.fields,
            self.progress,
        )?;
        Ok(encoded)
    }
}
