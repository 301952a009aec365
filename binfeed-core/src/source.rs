//! Tabular source reading and normalization.
//!
//! Sources come in two shapes:
//! - a directory of per-symbol CSV/Parquet files (symbol inferred from
//!   the file stem when the data has no symbol column), or
//! - a single flat table file holding many symbols, split by the
//!   configured symbol column.
//!
//! Either way the output is a [`SymbolTable`]: dates parsed, rows
//! deduplicated by date (last wins), sorted ascending, every other
//! column coerced to `f64`.

use crate::config::DumpConfig;
use crate::error::{DumpError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Canonical uppercase symbol code.
pub fn canonical_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Parse a raw date cell into a timestamp.
///
/// Accepts `YYYYMMDD` integers (optionally with a float `.0` tail from
/// lossy CSV inference), ISO dates, and ISO date-times with or without
/// fractional seconds. Returns `None` for anything else — unparseable
/// dates are excluded, not fatal.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Normalized per-symbol table: sorted unique dates plus named numeric
/// columns aligned to them.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    /// Canonical uppercase symbol code.
    pub symbol: String,
    /// Sorted ascending, unique after last-wins dedup.
    pub dates: Vec<NaiveDateTime>,
    /// Field names, in source column order.
    pub fields: Vec<String>,
    /// `values[f][i]` is field `f` at `dates[i]`. Missing cells are NaN.
    pub values: Vec<Vec<f64>>,
}

impl SymbolTable {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn min_date(&self) -> Option<NaiveDateTime> {
        self.dates.first().copied()
    }

    pub fn max_date(&self) -> Option<NaiveDateTime> {
        self.dates.last().copied()
    }

    /// Column values for a named field.
    pub fn field_values(&self, field: &str) -> Option<&[f64]> {
        self.fields
            .iter()
            .position(|f| f == field)
            .map(|i| self.values[i].as_slice())
    }

    /// Build from a raw polars frame: parse dates, drop unparseable rows,
    /// dedup by date (last wins), sort ascending, coerce columns to f64.
    pub fn from_dataframe(
        df: &DataFrame,
        date_field: &str,
        symbol_field: &str,
        symbol: &str,
        source_name: &str,
    ) -> Result<SymbolTable> {
        let date_col = df.column(date_field).map_err(|_| DumpError::Schema {
            column: date_field.to_string(),
            source_name: source_name.to_string(),
        })?;

        let date_strs = date_col
            .cast(&DataType::String)
            .map_err(DumpError::table)?;
        let date_strs = date_strs.str().map_err(DumpError::table)?;

        // Numeric columns: everything except the date and symbol fields
        // that casts to f64. Non-numeric columns are skipped.
        let mut fields: Vec<String> = Vec::new();
        let mut raw_columns: Vec<Vec<f64>> = Vec::new();
        for name in df.get_column_names() {
            let name = name.as_str();
            if name == date_field || name == symbol_field {
                continue;
            }
            let col = df.column(name).map_err(DumpError::table)?;
            // Dtype gate, not a cast attempt: a non-strict cast would turn
            // string cells into nulls instead of failing.
            let numeric = matches!(
                col.dtype(),
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
                    | DataType::Float32
                    | DataType::Float64
            );
            if !numeric {
                continue;
            }
            let cast = col.cast(&DataType::Float64).map_err(DumpError::table)?;
            let ca = cast.f64().map_err(DumpError::table)?;
            fields.push(name.to_string());
            raw_columns.push(ca.iter().map(|v| v.unwrap_or(f64::NAN)).collect());
        }

        // Last-wins dedup: later rows overwrite earlier rows for the same
        // date; BTreeMap iteration then gives ascending date order.
        let mut by_date: BTreeMap<NaiveDateTime, usize> = BTreeMap::new();
        for (row, raw) in date_strs.into_iter().enumerate() {
            let Some(raw) = raw else { continue };
            let Some(dt) = parse_datetime(raw) else {
                continue;
            };
            by_date.insert(dt, row);
        }

        let mut dates = Vec::with_capacity(by_date.len());
        let mut values: Vec<Vec<f64>> = fields
            .iter()
            .map(|_| Vec::with_capacity(by_date.len()))
            .collect();
        for (date, row) in by_date {
            dates.push(date);
            for (f, column) in raw_columns.iter().enumerate() {
                values[f].push(column[row]);
            }
        }

        Ok(SymbolTable {
            symbol: canonical_code(symbol),
            dates,
            fields,
            values,
        })
    }
}

/// Read a CSV or Parquet file into a frame, dispatching on suffix.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let lf = match suffix.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .map_err(DumpError::table)?,
        "parquet" => {
            LazyFrame::scan_parquet(path, Default::default()).map_err(DumpError::table)?
        }
        other => {
            return Err(DumpError::Format(format!(
                "unsupported file suffix '.{other}' for {}",
                path.display()
            )))
        }
    };
    lf.collect().map_err(DumpError::table)
}

/// One unit of per-symbol work.
///
/// Closed variant type: either a file we load lazily in a worker, or a
/// fragment of a flat multi-symbol table, normalized at discovery time.
#[derive(Debug, Clone)]
pub enum SourceInput {
    File { path: PathBuf, code: String },
    Fragment(SymbolTable),
}

impl SourceInput {
    /// Canonical symbol code for this input.
    pub fn code(&self) -> &str {
        match self {
            SourceInput::File { code, .. } => code,
            SourceInput::Fragment(table) => &table.symbol,
        }
    }

    /// Load and normalize this input's table.
    pub fn load(&self, config: &DumpConfig) -> Result<SymbolTable> {
        match self {
            SourceInput::File { path, code } => {
                let df = read_table(path)?;
                SymbolTable::from_dataframe(
                    &df,
                    &config.date_field,
                    &config.symbol_field,
                    code,
                    &path.display().to_string(),
                )
            }
            SourceInput::Fragment(table) => Ok(table.clone()),
        }
    }
}

/// The discovered set of per-symbol inputs for a run.
pub struct SourceSet {
    pub inputs: Vec<SourceInput>,
}

impl SourceSet {
    /// Scan the configured source path.
    ///
    /// A directory yields one `File` input per matching file, sorted by
    /// name. A single file is treated as a flat multi-symbol table and
    /// split by the symbol column (missing column is a schema error).
    pub fn discover(config: &DumpConfig) -> Result<SourceSet> {
        let path = &config.source_path;
        if !path.exists() {
            return Err(DumpError::NotFound(path.clone()));
        }

        let mut inputs = if path.is_dir() {
            Self::discover_files(path, config)?
        } else {
            Self::split_flat_table(path, config)?
        };

        if let Some(limit) = config.limit_nums {
            inputs.truncate(limit);
        }
        Ok(SourceSet { inputs })
    }

    fn discover_files(dir: &Path, config: &DumpConfig) -> Result<Vec<SourceInput>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(DumpError::io(dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(&config.file_suffix))
            })
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| {
                let code = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(canonical_code)
                    .unwrap_or_default();
                SourceInput::File { path, code }
            })
            .collect())
    }

    fn split_flat_table(path: &Path, config: &DumpConfig) -> Result<Vec<SourceInput>> {
        let df = read_table(path)?;
        if df.column(&config.symbol_field).is_err() {
            return Err(DumpError::Schema {
                column: config.symbol_field.clone(),
                source_name: path.display().to_string(),
            });
        }

        let groups = df
            .partition_by([config.symbol_field.as_str()], true)
            .map_err(DumpError::table)?;

        let mut inputs = Vec::with_capacity(groups.len());
        for group in &groups {
            let symbol_col = group
                .column(&config.symbol_field)
                .map_err(DumpError::table)?
                .cast(&DataType::String)
                .map_err(DumpError::table)?;
            let symbol = symbol_col
                .str()
                .map_err(DumpError::table)?
                .get(0)
                .unwrap_or_default()
                .to_string();
            let table = SymbolTable::from_dataframe(
                group,
                &config.date_field,
                &config.symbol_field,
                &symbol,
                &path.display().to_string(),
            )?;
            inputs.push(SourceInput::Fragment(table));
        }
        inputs.sort_by(|a, b| a.code().cmp(b.code()));
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yyyymmdd_integers() {
        let dt = parse_datetime("20200103").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2020, 1, 3).unwrap());
    }

    #[test]
    fn parses_float_tainted_yyyymmdd() {
        assert!(parse_datetime("20200103.0").is_some());
    }

    #[test]
    fn parses_iso_date_and_datetime() {
        assert!(parse_datetime("2020-01-03").is_some());
        assert!(parse_datetime("2020-01-03 09:30:00").is_some());
        assert!(parse_datetime("2020-01-03T09:30:00").is_some());
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_datetime("not-a-date").is_none());
        assert!(parse_datetime("202001").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn table_dedups_by_date_last_wins() {
        let df = df!(
            "date" => &["20200101", "20200102", "20200101"],
            "close" => &[10.0, 11.0, 12.0],
        )
        .unwrap();

        let table = SymbolTable::from_dataframe(&df, "date", "symbol", "spy", "test").unwrap();

        assert_eq!(table.dates.len(), 2);
        // The later row for 2020-01-01 wins
        assert_eq!(table.field_values("close").unwrap()[0], 12.0);
        assert_eq!(table.field_values("close").unwrap()[1], 11.0);
    }

    #[test]
    fn table_sorts_rows_and_drops_invalid_dates() {
        let df = df!(
            "date" => &["20200103", "bogus", "20200101"],
            "close" => &[3.0, 99.0, 1.0],
        )
        .unwrap();

        let table = SymbolTable::from_dataframe(&df, "date", "symbol", "spy", "test").unwrap();

        assert_eq!(table.dates.len(), 2);
        assert!(table.dates[0] < table.dates[1]);
        assert_eq!(table.field_values("close").unwrap(), &[1.0, 3.0]);
    }

    #[test]
    fn non_numeric_columns_are_skipped() {
        let df = df!(
            "date" => &["20200101"],
            "close" => &[10.0],
            "name" => &["Pudong Bank"],
        )
        .unwrap();

        let table = SymbolTable::from_dataframe(&df, "date", "symbol", "spy", "test").unwrap();
        assert!(table.field_values("close").is_some());
        assert!(table.field_values("name").is_none());
    }

    #[test]
    fn missing_date_column_is_schema_error() {
        let df = df!("close" => &[10.0]).unwrap();
        let err =
            SymbolTable::from_dataframe(&df, "date", "symbol", "spy", "test").unwrap_err();
        assert!(matches!(err, DumpError::Schema { .. }));
    }

    #[test]
    fn symbol_code_is_canonicalized() {
        let df = df!("date" => &["20200101"], "close" => &[1.0]).unwrap();
        let table = SymbolTable::from_dataframe(&df, "date", "symbol", " sh600000 ", "t").unwrap();
        assert_eq!(table.symbol, "SH600000");
    }

    #[test]
    fn unsupported_suffix_is_format_error() {
        let err = read_table(Path::new("/tmp/foo.xlsx")).unwrap_err();
        assert!(matches!(err, DumpError::Format(_)));
    }
}
