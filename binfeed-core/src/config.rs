//! Immutable dump configuration and binary store layout.
//!
//! One `DumpConfig` is constructed up front (from CLI flags or a TOML
//! file) and passed by reference to every component — there is no
//! process-wide mutable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory names and file suffixes of the on-disk store.
pub const CALENDARS_DIR: &str = "calendars";
pub const FEATURES_DIR: &str = "features";
pub const INSTRUMENTS_DIR: &str = "instruments";
pub const INSTRUMENTS_FILE: &str = "all.txt";
pub const BIN_SUFFIX: &str = "bin";
pub const INSTRUMENTS_SEP: char = '\t';

/// Calendar granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freq {
    /// Daily bars, dates formatted `YYYY-MM-DD`.
    Day,
    /// One-minute bars, timestamps formatted `YYYY-MM-DD HH:MM:SS`.
    Min1,
}

impl Freq {
    /// strftime format for calendar/instruments files at this granularity.
    pub fn calendar_format(self) -> &'static str {
        match self {
            Freq::Day => "%Y-%m-%d",
            Freq::Min1 => "%Y-%m-%d %H:%M:%S",
        }
    }

    /// Name used in file paths (`<freq>.txt`, `<field>.<freq>.bin`).
    pub fn as_str(self) -> &'static str {
        match self {
            Freq::Day => "day",
            Freq::Min1 => "1min",
        }
    }

    /// Format a timestamp for calendar/instruments files.
    pub fn format(self, dt: chrono::NaiveDateTime) -> String {
        dt.format(self.calendar_format()).to_string()
    }

    /// Parse a calendar/instruments timestamp at this granularity.
    pub fn parse(self, s: &str) -> Option<chrono::NaiveDateTime> {
        match self {
            Freq::Day => chrono::NaiveDate::parse_from_str(s.trim(), self.calendar_format())
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            Freq::Min1 => {
                chrono::NaiveDateTime::parse_from_str(s.trim(), self.calendar_format()).ok()
            }
        }
    }
}

impl std::str::FromStr for Freq {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Freq::Day),
            "1min" => Ok(Freq::Min1),
            other => Err(format!("unknown frequency '{other}' (expected day or 1min)")),
        }
    }
}

/// Field inclusion/exclusion filter. Inclusion wins when both are given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FieldFilter {
    /// Parse comma-separated include/exclude lists, dropping empty entries.
    pub fn from_lists(include: &str, exclude: &str) -> Self {
        let split = |s: &str| {
            s.split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        Self {
            include: split(include),
            exclude: split(exclude),
        }
    }

    /// Whether a field should be dumped.
    pub fn keep(&self, field: &str) -> bool {
        if !self.include.is_empty() {
            self.include.iter().any(|f| f.eq_ignore_ascii_case(field))
        } else {
            !self.exclude.iter().any(|f| f.eq_ignore_ascii_case(field))
        }
    }
}

/// Complete configuration for one dump run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Source directory of per-symbol files, or a single flat table file.
    pub source_path: PathBuf,

    /// Root of the binary store (calendars/, features/, instruments/).
    pub output_root: PathBuf,

    /// If set, the output root is copied here before any mutation.
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    #[serde(default = "defaults::freq")]
    pub freq: Freq,

    /// Worker pool size for the per-symbol phases.
    #[serde(default = "defaults::max_workers")]
    pub max_workers: usize,

    #[serde(default = "defaults::date_field")]
    pub date_field: String,

    #[serde(default = "defaults::symbol_field")]
    pub symbol_field: String,

    /// Suffix matched when scanning a source directory (e.g. `.csv`).
    #[serde(default = "defaults::file_suffix")]
    pub file_suffix: String,

    #[serde(default)]
    pub fields: FieldFilter,

    /// Process at most this many symbols (testing aid).
    #[serde(default)]
    pub limit_nums: Option<usize>,
}

mod defaults {
    use super::Freq;

    pub fn freq() -> Freq {
        Freq::Day
    }
    pub fn max_workers() -> usize {
        16
    }
    pub fn date_field() -> String {
        "date".into()
    }
    pub fn symbol_field() -> String {
        "symbol".into()
    }
    pub fn file_suffix() -> String {
        ".csv".into()
    }
}

impl DumpConfig {
    pub fn new(source_path: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            output_root: output_root.into(),
            backup_dir: None,
            freq: defaults::freq(),
            max_workers: defaults::max_workers(),
            date_field: defaults::date_field(),
            symbol_field: defaults::symbol_field(),
            file_suffix: defaults::file_suffix(),
            fields: FieldFilter::default(),
            limit_nums: None,
        }
    }

    pub fn calendars_dir(&self) -> PathBuf {
        self.output_root.join(CALENDARS_DIR)
    }

    pub fn features_dir(&self) -> PathBuf {
        self.output_root.join(FEATURES_DIR)
    }

    pub fn instruments_dir(&self) -> PathBuf {
        self.output_root.join(INSTRUMENTS_DIR)
    }

    /// `<output_root>/calendars/<freq>.txt`
    pub fn calendar_path(&self) -> PathBuf {
        self.calendars_dir().join(format!("{}.txt", self.freq.as_str()))
    }

    /// `<output_root>/instruments/all.txt`
    pub fn instruments_path(&self) -> PathBuf {
        self.instruments_dir().join(INSTRUMENTS_FILE)
    }

    /// `<output_root>/features/<symbol_lowercase>/`
    pub fn symbol_features_dir(&self, code: &str) -> PathBuf {
        self.features_dir().join(code.to_lowercase())
    }
}
