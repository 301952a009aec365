//! Progress callbacks for multi-symbol dump phases.
//!
//! The dumpers report through this trait instead of logging directly, so
//! the CLI can print and tests can stay silent.

use crate::error::DumpError;

/// Progress sink for a dump run.
pub trait DumpProgress: Send + Sync {
    /// Called when a phase (date collection, calendar dump, feature dump, ...) begins.
    fn on_phase_start(&self, phase: &str, total_symbols: usize);

    /// Called when one symbol's work in the current phase completes.
    /// `error` is `Some` when that symbol failed.
    fn on_symbol_done(&self, symbol: &str, error: Option<&DumpError>);

    /// Non-fatal condition (empty table, empty calendar, skipped field).
    fn warn(&self, message: &str);

    /// Called when the whole run finishes.
    fn on_run_complete(&self, processed: usize, skipped: usize, failed: usize);
}

/// Progress reporter that prints to stdout/stderr.
pub struct StdoutProgress;

impl DumpProgress for StdoutProgress {
    fn on_phase_start(&self, phase: &str, total_symbols: usize) {
        println!("start {phase} ({total_symbols} symbols)...");
    }

    fn on_symbol_done(&self, symbol: &str, error: Option<&DumpError>) {
        if let Some(e) = error {
            eprintln!("  FAIL: {symbol}: {e}");
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("WARNING: {message}");
    }

    fn on_run_complete(&self, processed: usize, skipped: usize, failed: usize) {
        println!("dump complete: {processed} processed, {skipped} skipped, {failed} failed");
    }
}

/// No-op sink for tests.
pub struct SilentProgress;

impl DumpProgress for SilentProgress {
    fn on_phase_start(&self, _phase: &str, _total_symbols: usize) {}
    fn on_symbol_done(&self, _symbol: &str, _error: Option<&DumpError>) {}
    fn warn(&self, _message: &str) {}
    fn on_run_complete(&self, _processed: usize, _skipped: usize, _failed: usize) {}
}
