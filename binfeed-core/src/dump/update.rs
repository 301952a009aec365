//! Update dump: extend the calendar at the tail and append new rows.
//!
//! Per symbol: known symbols with rows past their registered end get a
//! tail append; unknown symbols get a fresh full encode. One symbol's
//! failure is recorded and does not stop the others — the error map
//! comes back in the [`DumpReport`].

use super::{backup_output_root, build_pool, calendar_hash, DumpReport};
use crate::calendar::Calendar;
use crate::config::DumpConfig;
use crate::encoder;
use crate::error::{DumpError, Result};
use crate::instruments::{DateRange, InstrumentRegistry};
use crate::progress::DumpProgress;
use crate::source::{SourceSet, SymbolTable};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Update-mode orchestrator.
pub struct DumpUpdate<'a> {
    config: &'a DumpConfig,
    progress: &'a dyn DumpProgress,
}

/// What happened to one symbol. Registry mutations derived from these
/// are applied single-threaded after the parallel phase.
enum Outcome {
    Appended { new_end: NaiveDateTime },
    FullDumped { range: DateRange },
    Skipped,
}

impl<'a> DumpUpdate<'a> {
    pub fn new(config: &'a DumpConfig, progress: &'a dyn DumpProgress) -> Self {
        Self { config, progress }
    }

    pub fn dump(&self) -> Result<DumpReport> {
        backup_output_root(self.config)?;
        let mut calendar = Calendar::load(&self.config.calendar_path(), self.config.freq)?;
        let mut registry =
            InstrumentRegistry::load(&self.config.instruments_path(), self.config.freq)?;
        let sources = SourceSet::discover(self.config)?;
        let pool = build_pool(self.config.max_workers)?;

        // Load every source up front (I/O bound); a failed load is a
        // per-symbol error, not a run abort.
        self.progress
            .on_phase_start("source load", sources.inputs.len());
        let loaded: Vec<(String, Result<SymbolTable>)> = pool.install(|| {
            sources
                .inputs
                .par_iter()
                .map(|input| (input.code().to_string(), input.load(self.config)))
                .collect()
        });

        let mut errors: BTreeMap<String, String> = BTreeMap::new();
        let mut tables: Vec<SymbolTable> = Vec::with_capacity(loaded.len());
        for (code, result) in loaded {
            match result {
                Ok(table) => tables.push(table),
                Err(e) => {
                    errors.insert(code, e.to_string());
                }
            }
        }

        // Calendar barrier: extend and persist before any encode.
        calendar.extend(tables.iter().flat_map(|t| t.dates.iter().copied()));
        calendar.save(&self.config.calendar_path())?;

        self.progress.on_phase_start("feature update", tables.len());
        let results: Vec<(String, Result<Outcome>)> = pool.install(|| {
            tables
                .par_iter()
                .map(|table| {
                    let result = self.process_symbol(table, &calendar, &registry);
                    self.progress
                        .on_symbol_done(&table.symbol, result.as_ref().err());
                    (table.symbol.clone(), result)
                })
                .collect()
        });

        let mut processed = 0;
        let mut skipped = 0;
        for (code, result) in results {
            match result {
                Ok(Outcome::Appended { new_end }) => {
                    registry.advance_end(&code, new_end);
                    processed += 1;
                }
                Ok(Outcome::FullDumped { range }) => {
                    registry.insert_if_absent(code, range);
                    processed += 1;
                }
                Ok(Outcome::Skipped) => skipped += 1,
                Err(e) => {
                    errors.insert(code, e.to_string());
                }
            }
        }
        registry.save(&self.config.instruments_path(), self.config.freq)?;

        let report = DumpReport {
            symbols_processed: processed,
            symbols_skipped: skipped,
            errors,
            calendar_hash: calendar_hash(&self.config.calendar_path())?,
        };
        self.progress
            .on_run_complete(processed, skipped, report.errors.len());
        Ok(report)
    }

    fn process_symbol(
        &self,
        table: &SymbolTable,
        calendar: &Calendar,
        registry: &InstrumentRegistry,
    ) -> Result<Outcome> {
        if table.is_empty() {
            self.progress
                .warn(&format!("{}: table is empty, skipped", table.symbol));
            return Ok(Outcome::Skipped);
        }
        let min = table.min_date().unwrap();
        let max = table.max_date().unwrap();
        let features_dir = self.config.symbol_features_dir(&table.symbol);

        match registry.get(&table.symbol) {
            Some(range) => {
                if max <= range.end {
                    return Ok(Outcome::Skipped);
                }
                // The tail starts one slot past the registered end.
                let end_index =
                    calendar
                        .index_of(range.end)
                        .ok_or_else(|| DumpError::Alignment {
                            symbol: table.symbol.clone(),
                            date: calendar.freq().format(range.end),
                        })?;
                encoder::append_tail(
                    table,
                    calendar,
                    end_index + 1,
                    &features_dir,
                    &self.config.fields,
                    self.progress,
                )?;
                Ok(Outcome::Appended { new_end: max })
            }
            None => {
                encoder::encode_full(
                    table,
                    calendar,
                    &features_dir,
                    &self.config.fields,
                    self.progress,
                )?;
                Ok(Outcome::FullDumped {
                    range: DateRange::new(min, max),
                })
            }
        }
    }
}
