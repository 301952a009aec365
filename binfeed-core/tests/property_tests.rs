//! Property tests for calendar and encoder invariants.
//!
//! Uses proptest to verify:
//! 1. Calendar build — sorted, duplicate-free, equals the exact union
//! 2. Extend-only growth — the prefix never changes, appends are
//!    strictly later and sorted
//! 3. Encoder round-trip — decoded values match the source at every
//!    written calendar position, NaN at gaps

use binfeed_core::{encoder, Calendar, FieldFilter, Freq, SilentProgress, SymbolTable};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn base_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn to_date(offset: u16) -> NaiveDateTime {
    base_date() + Duration::days(offset as i64)
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_date_offsets() -> impl Strategy<Value = Vec<u16>> {
    prop::collection::vec(0u16..400, 0..60)
}

fn arb_close_values(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1000.0_f64, len..=len)
}

// ── 1. Calendar build ────────────────────────────────────────────────

proptest! {
    /// The built calendar is sorted, duplicate-free, and equals the
    /// exact union of all input date sets.
    #[test]
    fn calendar_is_sorted_dedup_union(
        a in arb_date_offsets(),
        b in arb_date_offsets(),
        c in arb_date_offsets(),
    ) {
        let all: Vec<NaiveDateTime> = a
            .iter()
            .chain(&b)
            .chain(&c)
            .map(|&o| to_date(o))
            .collect();
        let expected: BTreeSet<NaiveDateTime> = all.iter().copied().collect();

        let cal = Calendar::build(Freq::Day, all);

        prop_assert_eq!(cal.len(), expected.len());
        prop_assert!(cal.dates().windows(2).all(|w| w[0] < w[1]));
        for (i, date) in expected.iter().enumerate() {
            prop_assert_eq!(cal.dates()[i], *date);
        }
    }

    /// Build order does not matter: shuffled input gives the same calendar.
    #[test]
    fn calendar_build_is_order_independent(offsets in arb_date_offsets()) {
        let forward: Vec<NaiveDateTime> = offsets.iter().map(|&o| to_date(o)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let cal1 = Calendar::build(Freq::Day, forward);
        let cal2 = Calendar::build(Freq::Day, reversed);
        prop_assert_eq!(cal1.dates(), cal2.dates());
    }
}

// ── 2. Extend-only growth ────────────────────────────────────────────

proptest! {
    /// Extend never changes any existing element and only appends
    /// strictly-later dates, in sorted order.
    #[test]
    fn extend_preserves_prefix_and_appends_sorted(
        old in arb_date_offsets(),
        new in arb_date_offsets(),
    ) {
        prop_assume!(!old.is_empty());
        let mut cal = Calendar::build(Freq::Day, old.iter().map(|&o| to_date(o)));
        let before = cal.dates().to_vec();
        let last = cal.last().unwrap();

        let added = cal.extend(new.iter().map(|&o| to_date(o)));

        // Prefix unchanged
        prop_assert_eq!(&cal.dates()[..before.len()], &before[..]);
        // Appended tail is strictly later and sorted
        let tail = &cal.dates()[before.len()..];
        prop_assert_eq!(tail.len(), added);
        prop_assert!(tail.iter().all(|d| *d > last));
        prop_assert!(cal.dates().windows(2).all(|w| w[0] < w[1]));

        // Exactly the distinct new dates past the old tail were appended
        let expected: BTreeSet<NaiveDateTime> = new
            .iter()
            .map(|&o| to_date(o))
            .filter(|d| *d > last)
            .collect();
        prop_assert_eq!(added, expected.len());
    }
}

// ── 3. Encoder round-trip ────────────────────────────────────────────

proptest! {
    /// Encoding a symbol's table then decoding the binary file
    /// reproduces every value at its calendar position, NaN at gaps.
    #[test]
    fn encode_decode_round_trip(
        calendar_offsets in prop::collection::btree_set(0u16..200, 2..40),
        selector in prop::collection::vec(any::<bool>(), 40),
    ) {
        let calendar_dates: Vec<NaiveDateTime> =
            calendar_offsets.iter().map(|&o| to_date(o)).collect();
        let cal = Calendar::build(Freq::Day, calendar_dates.clone());

        // The symbol is active on a subset of calendar dates
        let active: Vec<NaiveDateTime> = calendar_dates
            .iter()
            .zip(&selector)
            .filter(|(_, keep)| **keep)
            .map(|(d, _)| *d)
            .collect();
        prop_assume!(!active.is_empty());

        let values: Vec<f64> = (0..active.len()).map(|i| (i + 1) as f64 * 1.5).collect();
        let table = SymbolTable {
            symbol: "PROP".into(),
            dates: active.clone(),
            fields: vec!["close".into()],
            values: vec![values.clone()],
        };

        let dir = tempfile::tempdir().unwrap();
        encoder::encode_full(&table, &cal, dir.path(), &FieldFilter::default(), &SilentProgress)
            .unwrap();
        let (start, decoded) = encoder::read_series(dir.path(), "close", Freq::Day).unwrap();

        // Header is the calendar index of the first active date
        prop_assert_eq!(start, cal.index_of(active[0]).unwrap());
        // Length covers exactly the symbol's own calendar span
        let end = cal.index_of(*active.last().unwrap()).unwrap();
        prop_assert_eq!(decoded.len(), end - start + 1);

        // Every slot either matches the source value or is a NaN gap
        let mut next_value = 0usize;
        for (offset, slot) in decoded.iter().enumerate() {
            let date = cal.get(start + offset).unwrap();
            if active.contains(&date) {
                prop_assert_eq!(*slot, values[next_value] as f32);
                next_value += 1;
            } else {
                prop_assert!(slot.is_nan());
            }
        }
        prop_assert_eq!(next_value, values.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Append after a full encode never rewrites existing bytes.
    #[test]
    fn append_never_rewrites_existing_bytes(
        head_len in 1usize..20,
        tail_len in 1usize..20,
        closes in arb_close_values(40),
    ) {
        let offsets: Vec<u16> = (0..(head_len + tail_len) as u16).collect();
        let dates: Vec<NaiveDateTime> = offsets.iter().map(|&o| to_date(o)).collect();

        let head_cal = Calendar::build(Freq::Day, dates[..head_len].to_vec());
        let head_table = SymbolTable {
            symbol: "PROP".into(),
            dates: dates[..head_len].to_vec(),
            fields: vec!["close".into()],
            values: vec![closes[..head_len].to_vec()],
        };

        let dir = tempfile::tempdir().unwrap();
        encoder::encode_full(
            &head_table, &head_cal, dir.path(), &FieldFilter::default(), &SilentProgress,
        )
        .unwrap();
        let before = std::fs::read(dir.path().join("close.day.bin")).unwrap();

        let full_cal = Calendar::build(Freq::Day, dates.clone());
        let full_table = SymbolTable {
            symbol: "PROP".into(),
            dates: dates.clone(),
            fields: vec!["close".into()],
            values: vec![closes[..head_len + tail_len].to_vec()],
        };
        encoder::append_tail(
            &full_table, &full_cal, head_len, dir.path(), &FieldFilter::default(),
            &SilentProgress,
        )
        .unwrap();

        let after = std::fs::read(dir.path().join("close.day.bin")).unwrap();
        prop_assert_eq!(&after[..before.len()], &before[..]);
        prop_assert_eq!(after.len(), before.len() + tail_len * 4);
    }
}
