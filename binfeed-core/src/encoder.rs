//! Binary column encoder.
//!
//! One file per (symbol, field): `<features_dir>/<field_lower>.<freq>.bin`,
//! a flat little-endian `f32` array. The first slot is the calendar index
//! at which the series starts; every following slot is the field's value
//! for consecutive calendar dates, gaps as NaN. File length (minus the
//! header slot) therefore always equals the covered calendar span.

use crate::calendar::Calendar;
use crate::config::{FieldFilter, Freq, BIN_SUFFIX};
use crate::error::{DumpError, Result};
use crate::progress::DumpProgress;
use crate::source::SymbolTable;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// `<features_dir>/<field_lowercase>.<freq>.bin`
pub fn bin_path(features_dir: &Path, field: &str, freq: Freq) -> PathBuf {
    features_dir.join(format!(
        "{}.{}.{BIN_SUFFIX}",
        field.to_lowercase(),
        freq.as_str()
    ))
}

/// Write a symbol's full history: header slot plus one value per
/// calendar date in the table's own min..=max span. Overwrites any
/// existing file atomically.
pub fn encode_full(
    table: &SymbolTable,
    calendar: &Calendar,
    features_dir: &Path,
    filter: &FieldFilter,
    progress: &dyn DumpProgress,
) -> Result<()> {
    let Some(span) = table_span(table, calendar, progress)? else {
        return Ok(());
    };
    let rows = reindex_rows(table, calendar, span.start_index, span.end_index);

    fs::create_dir_all(features_dir).map_err(DumpError::io(features_dir))?;
    for (f, field) in table.fields.iter().enumerate() {
        if !filter.keep(field) {
            continue;
        }
        let mut bytes = Vec::with_capacity((rows.len() + 1) * 4);
        bytes.extend_from_slice(&(span.start_index as f32).to_le_bytes());
        for row in &rows {
            let value = row.map_or(f32::NAN, |i| table.values[f][i] as f32);
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        write_atomic(&bin_path(features_dir, field, calendar.freq()), &bytes)?;
    }
    Ok(())
}

/// Append a symbol's tail: values for calendar positions `from_index..`
/// through the table's max date, gaps as NaN, no header rewrite.
///
/// `from_index` must be the next unwritten calendar slot of the existing
/// files (the orchestrator derives it from the registry's recorded end);
/// a mismatch against the file on disk is an alignment error. Fields
/// whose file does not exist yet fall back to a full write.
pub fn append_tail(
    table: &SymbolTable,
    calendar: &Calendar,
    from_index: usize,
    features_dir: &Path,
    filter: &FieldFilter,
    progress: &dyn DumpProgress,
) -> Result<()> {
    let Some(span) = table_span(table, calendar, progress)? else {
        return Ok(());
    };
    if from_index > span.end_index {
        progress.warn(&format!(
            "{}: no calendar slots to append past index {from_index}",
            table.symbol
        ));
        return Ok(());
    }
    let rows = reindex_rows(table, calendar, from_index, span.end_index);
    let full_rows = reindex_rows(table, calendar, span.start_index, span.end_index);

    fs::create_dir_all(features_dir).map_err(DumpError::io(features_dir))?;
    for (f, field) in table.fields.iter().enumerate() {
        if !filter.keep(field) {
            continue;
        }
        let path = bin_path(features_dir, field, calendar.freq());
        if !path.exists() {
            // A field that appeared after the initial dump gets a fresh
            // full-history file.
            let mut bytes = Vec::with_capacity((full_rows.len() + 1) * 4);
            bytes.extend_from_slice(&(span.start_index as f32).to_le_bytes());
            for row in &full_rows {
                let value = row.map_or(f32::NAN, |i| table.values[f][i] as f32);
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            write_atomic(&path, &bytes)?;
            continue;
        }

        verify_append_offset(&path, from_index, &table.symbol, calendar)?;
        let mut bytes = Vec::with_capacity(rows.len() * 4);
        for row in &rows {
            let value = row.map_or(f32::NAN, |i| table.values[f][i] as f32);
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(DumpError::io(&path))?;
        file.write_all(&bytes).map_err(DumpError::io(&path))?;
    }
    Ok(())
}

/// Decode a field file: (start calendar index, values in calendar order).
pub fn read_series(features_dir: &Path, field: &str, freq: Freq) -> Result<(usize, Vec<f32>)> {
    let path = bin_path(features_dir, field, freq);
    if !path.exists() {
        return Err(DumpError::NotFound(path));
    }
    let mut bytes = Vec::new();
    fs::File::open(&path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(DumpError::io(&path))?;
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        return Err(DumpError::Format(format!(
            "truncated binary series file {} ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }
    let mut slots = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    let start_index = slots.next().unwrap_or(0.0) as usize;
    Ok((start_index, slots.collect()))
}

struct Span {
    start_index: usize,
    end_index: usize,
}

/// Calendar span covered by the table's own min..=max dates.
///
/// Empty table or calendar is a warning, not an error; a min/max date
/// missing from the calendar means the orchestrator skipped the
/// calendar-extend barrier.
fn table_span(
    table: &SymbolTable,
    calendar: &Calendar,
    progress: &dyn DumpProgress,
) -> Result<Option<Span>> {
    if table.is_empty() {
        progress.warn(&format!("{}: table is empty, skipped", table.symbol));
        return Ok(None);
    }
    if calendar.is_empty() {
        progress.warn("calendar is empty, nothing to encode");
        return Ok(None);
    }
    let min = table.min_date().unwrap();
    let max = table.max_date().unwrap();
    let start_index = calendar.index_of(min).ok_or_else(|| DumpError::Alignment {
        symbol: table.symbol.clone(),
        date: calendar.freq().format(min),
    })?;
    let end_index = calendar.index_of(max).ok_or_else(|| DumpError::Alignment {
        symbol: table.symbol.clone(),
        date: calendar.freq().format(max),
    })?;
    Ok(Some(Span {
        start_index,
        end_index,
    }))
}

/// For each calendar position in `start..=end`, the table row holding
/// that date, or `None` for a gap.
fn reindex_rows(
    table: &SymbolTable,
    calendar: &Calendar,
    start: usize,
    end: usize,
) -> Vec<Option<usize>> {
    calendar.dates()[start..=end]
        .iter()
        .map(|date| table.dates.binary_search(date).ok())
        .collect()
}

/// The existing file must end exactly one slot before `from_index`.
fn verify_append_offset(
    path: &Path,
    from_index: usize,
    symbol: &str,
    calendar: &Calendar,
) -> Result<()> {
    let meta = fs::metadata(path).map_err(DumpError::io(path))?;
    let mut header = [0u8; 4];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .map_err(DumpError::io(path))?;
    let file_start = f32::from_le_bytes(header) as usize;
    let value_count = (meta.len() as usize / 4).saturating_sub(1);
    if file_start + value_count != from_index {
        return Err(DumpError::Alignment {
            symbol: symbol.to_string(),
            date: calendar
                .get(from_index)
                .map(|d| calendar.freq().format(d))
                .unwrap_or_else(|| format!("index {from_index}")),
        });
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("bin.tmp");
    fs::write(&tmp, bytes).map_err(DumpError::io(&tmp))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DumpError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
