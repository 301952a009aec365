//! BinFeed Core — time-series dump/update pipeline.
//!
//! Converts heterogeneous tabular source data (per-symbol CSV/Parquet
//! files or a flat multi-symbol table) into a compact, append-friendly
//! binary columnar store keyed by one global trading calendar:
//! - Source readers and table normalization
//! - Global calendar (build / load / extend-only growth)
//! - Instrument registry (per-symbol date ranges)
//! - Binary column encoder (offset-addressed f32 series, tail append)
//! - Full / fix / update dump orchestrators

pub mod calendar;
pub mod config;
pub mod dump;
pub mod encoder;
pub mod error;
pub mod instruments;
pub mod progress;
pub mod source;

pub use calendar::Calendar;
pub use config::{DumpConfig, FieldFilter, Freq};
pub use dump::{DumpAll, DumpFix, DumpReport, DumpUpdate};
pub use error::{DumpError, Result};
pub use instruments::{DateRange, InstrumentRegistry};
pub use progress::{DumpProgress, SilentProgress, StdoutProgress};
pub use source::{SourceInput, SourceSet, SymbolTable};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types that cross the worker pool are
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<SymbolTable>();
        require_sync::<SymbolTable>();
        require_send::<SourceInput>();
        require_sync::<SourceInput>();
        require_send::<Calendar>();
        require_sync::<Calendar>();
        require_send::<InstrumentRegistry>();
        require_sync::<InstrumentRegistry>();
        require_send::<DumpConfig>();
        require_sync::<DumpConfig>();
    }
}
