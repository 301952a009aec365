//! Structured error types for the dump pipeline.
//!
//! These are designed to be displayable in both CLI and library contexts.
//! Fatality is decided by the orchestrator, not here: full/fix runs abort
//! on the first error, update runs collect per-symbol failures into a
//! report and keep going.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while dumping tabular source data into the binary store.
#[derive(Debug, Error)]
pub enum DumpError {
    /// Source file suffix or shape is not something we know how to read.
    #[error("unrecognized source format: {0}")]
    Format(String),

    /// A required column is missing from a source table.
    #[error("missing required column '{column}' in {source_name}")]
    Schema { column: String, source_name: String },

    /// A symbol's date is not present in the global calendar.
    ///
    /// This is an ordering violation: the calendar must be built or
    /// extended before any encode starts.
    #[error("symbol '{symbol}' has date {date} outside the global calendar")]
    Alignment { symbol: String, date: String },

    /// Calendar or instruments file absent — fix/update need an existing store.
    #[error("store file not found: {0} — run a full dump first")]
    NotFound(PathBuf),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Table engine (polars) error passthrough.
    #[error("table operation failed: {0}")]
    Table(String),

    /// Worker pool construction failed.
    #[error("worker pool: {0}")]
    Pool(String),
}

impl DumpError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> DumpError {
        let path = path.into();
        move |source| DumpError::Io { path, source }
    }

    pub(crate) fn table(e: polars::prelude::PolarsError) -> DumpError {
        DumpError::Table(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DumpError>;
