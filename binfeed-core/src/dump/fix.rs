//! Fix dump: backfill symbols added after the initial full dump.
//!
//! Only symbols absent from the registry are processed; already-known
//! symbols' binary files are left byte-for-byte untouched. The calendar
//! is not extended — a new symbol whose dates fall outside it is an
//! alignment error (run an update instead).

use super::{backup_output_root, build_pool, calendar_hash, DumpReport};
use crate::calendar::Calendar;
use crate::config::DumpConfig;
use crate::encoder;
use crate::error::Result;
use crate::instruments::{DateRange, InstrumentRegistry};
use crate::progress::DumpProgress;
use crate::source::{SourceInput, SourceSet};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Fix-mode orchestrator.
pub struct DumpFix<'a> {
    config: &'a DumpConfig,
    progress: &'a dyn DumpProgress,
}

impl<'a> DumpFix<'a> {
    pub fn new(config: &'a DumpConfig, progress: &'a dyn DumpProgress) -> Self {
        Self { config, progress }
    }

    pub fn dump(&self) -> Result<DumpReport> {
        backup_output_root(self.config)?;
        let calendar = Calendar::load(&self.config.calendar_path(), self.config.freq)?;
        let mut registry =
            InstrumentRegistry::load(&self.config.instruments_path(), self.config.freq)?;
        let sources = SourceSet::discover(self.config)?;

        let new_inputs: Vec<&SourceInput> = sources
            .inputs
            .iter()
            .filter(|input| !registry.contains(input.code()))
            .collect();
        let skipped = sources.inputs.len() - new_inputs.len();

        self.progress
            .on_phase_start("fix dump (new symbols only)", new_inputs.len());
        let pool = build_pool(self.config.max_workers)?;
        let encoded: Vec<Result<(String, Option<DateRange>)>> = pool.install(|| {
            new_inputs
                .par_iter()
                .map(|&input| {
                    let result = self.encode_one(input, &calendar);
                    self.progress.on_symbol_done(input.code(), result.as_ref().err());
                    result
                })
                .collect()
        });

        let mut processed = 0;
        for result in encoded {
            let (code, range) = result?;
            if let Some(range) = range {
                registry.insert_if_absent(code, range);
            }
            processed += 1;
        }
        registry.save(&self.config.instruments_path(), self.config.freq)?;

        let report = DumpReport {
            symbols_processed: processed,
            symbols_skipped: skipped,
            errors: BTreeMap::new(),
            calendar_hash: calendar_hash(&self.config.calendar_path())?,
        };
        self.progress.on_run_complete(processed, skipped, 0);
        Ok(report)
    }

    fn encode_one(
        &self,
        input: &SourceInput,
        calendar: &Calendar,
    ) -> Result<(String, Option<DateRange>)> {
        let table = input.load(self.config)?;
        let range = match (table.min_date(), table.max_date()) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            _ => None,
        };
        encoder::encode_full(
            &table,
            calendar,
            &self.config.symbol_features_dir(&table.symbol),
            &self.config.fields,
            self.progress,
        )?;
        Ok((table.symbol, range))
    }
}
