//! The global trading calendar.
//!
//! One sorted, strictly increasing sequence of distinct timestamps — the
//! union of every symbol's observed dates. Binary feature files address
//! values by position in this sequence, so across incremental updates the
//! calendar only ever grows at the tail: inserting a date in the middle
//! would silently misalign every existing `.bin` file.

use crate::config::Freq;
use crate::error::{DumpError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Sorted, deduplicated global calendar with its granularity attached.
#[derive(Debug, Clone)]
pub struct Calendar {
    dates: Vec<NaiveDateTime>,
    freq: Freq,
}

impl Calendar {
    /// Build from the union of all observed dates.
    ///
    /// Deterministic regardless of input order: the BTreeSet sort/dedup
    /// makes repeated runs over identical inputs byte-identical on save.
    pub fn build(freq: Freq, dates: impl IntoIterator<Item = NaiveDateTime>) -> Calendar {
        let set: BTreeSet<NaiveDateTime> = dates.into_iter().collect();
        Calendar {
            dates: set.into_iter().collect(),
            freq,
        }
    }

    /// Load an existing calendar file (one formatted date per line).
    pub fn load(path: &Path, freq: Freq) -> Result<Calendar> {
        if !path.exists() {
            return Err(DumpError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(DumpError::io(path))?;
        let mut dates = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let dt = freq.parse(line).ok_or_else(|| {
                DumpError::Format(format!(
                    "bad calendar line '{line}' in {}",
                    path.display()
                ))
            })?;
            dates.push(dt);
        }
        dates.sort();
        dates.dedup();
        Ok(Calendar { dates, freq })
    }

    /// Append every date strictly greater than the current tail, in
    /// sorted order. Existing entries are never reordered or removed.
    ///
    /// Returns how many dates were appended.
    pub fn extend(&mut self, new_dates: impl IntoIterator<Item = NaiveDateTime>) -> usize {
        let Some(&last) = self.dates.last() else {
            // Empty calendar: extension degenerates to a build.
            let built = Calendar::build(self.freq, new_dates);
            let added = built.len();
            self.dates = built.dates;
            return added;
        };
        let tail: BTreeSet<NaiveDateTime> =
            new_dates.into_iter().filter(|d| *d > last).collect();
        let added = tail.len();
        self.dates.extend(tail);
        added
    }

    /// Atomic whole-file rewrite: write to `.tmp`, rename into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(DumpError::io(parent))?;
        }
        let tmp = path.with_extension("txt.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(DumpError::io(&tmp))?;
            for date in &self.dates {
                writeln!(file, "{}", self.freq.format(*date)).map_err(DumpError::io(&tmp))?;
            }
        }
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            DumpError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }

    /// Zero-based position of a date — the binary files' addressing unit.
    pub fn index_of(&self, date: NaiveDateTime) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn get(&self, index: usize) -> Option<NaiveDateTime> {
        self.dates.get(index).copied()
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.dates.last().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.dates
    }

    pub fn freq(&self) -> Freq {
        self.freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn build_unions_sorts_and_dedups() {
        let cal = Calendar::build(
            Freq::Day,
            vec![
                day(2020, 1, 3),
                day(2020, 1, 1),
                day(2020, 1, 2),
                day(2020, 1, 1),
            ],
        );
        assert_eq!(
            cal.dates(),
            &[day(2020, 1, 1), day(2020, 1, 2), day(2020, 1, 3)]
        );
    }

    #[test]
    fn extend_appends_only_strictly_later_dates() {
        let mut cal = Calendar::build(Freq::Day, vec![day(2020, 1, 1), day(2020, 1, 3)]);
        let added = cal.extend(vec![
            day(2020, 1, 2), // inside the existing range: must not be inserted
            day(2020, 1, 3), // equal to tail: must not be duplicated
            day(2020, 1, 5),
            day(2020, 1, 4),
        ]);
        assert_eq!(added, 2);
        assert_eq!(
            cal.dates(),
            &[
                day(2020, 1, 1),
                day(2020, 1, 3),
                day(2020, 1, 4),
                day(2020, 1, 5)
            ]
        );
    }

    #[test]
    fn extend_empty_calendar_builds_fresh() {
        let mut cal = Calendar::build(Freq::Day, vec![]);
        cal.extend(vec![day(2020, 1, 2), day(2020, 1, 1)]);
        assert_eq!(cal.dates(), &[day(2020, 1, 1), day(2020, 1, 2)]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day.txt");
        let cal = Calendar::build(Freq::Day, vec![day(2020, 1, 1), day(2020, 1, 2)]);
        cal.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2020-01-01\n2020-01-02\n");

        let loaded = Calendar::load(&path, Freq::Day).unwrap();
        assert_eq!(loaded.dates(), cal.dates());
    }

    #[test]
    fn minute_calendar_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1min.txt");
        let minute = |h: u32, m: u32| {
            NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        let cal = Calendar::build(Freq::Min1, vec![minute(9, 31), minute(9, 30)]);
        cal.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "2020-01-01 09:30:00\n2020-01-01 09:31:00\n");

        let loaded = Calendar::load(&path, Freq::Min1).unwrap();
        assert_eq!(loaded.dates(), cal.dates());
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = Calendar::load(Path::new("/nonexistent/day.txt"), Freq::Day).unwrap_err();
        assert!(matches!(err, DumpError::NotFound(_)));
    }

    #[test]
    fn index_of_is_calendar_position() {
        let cal = Calendar::build(
            Freq::Day,
            vec![day(2020, 1, 1), day(2020, 1, 2), day(2020, 1, 4)],
        );
        assert_eq!(cal.index_of(day(2020, 1, 2)), Some(1));
        assert_eq!(cal.index_of(day(2020, 1, 3)), None);
    }
}
