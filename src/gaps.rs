//! Gap detection and merging over stored and freshly fetched records
//!
//! Both functions are pure so that the cache reconciliation can be tested
//! without a store or a network.

use crate::core::{DateRange, PriceRecord};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Contiguous sub-ranges of `range` held neither by a record nor by a coverage mark.
///
/// Adjacent missing days are coalesced so that each gap costs one upstream call.
pub fn missing_ranges(
    range: DateRange,
    covered: &[DateRange],
    present: &BTreeSet<NaiveDate>,
) -> Vec<DateRange> {
    let mut gaps = Vec::new();
    let mut open: Option<(NaiveDate, NaiveDate)> = None;

    for day in range.days() {
        let held = present.contains(&day) || covered.iter().any(|c| c.contains(day));
        match (held, open.as_mut()) {
            (false, Some((_, end))) => *end = day,
            (false, None) => open = Some((day, day)),
            (true, Some(_)) => gaps.extend(open.take().map(to_range)),
            (true, None) => {}
        }
    }
    gaps.extend(open.map(to_range));
    gaps
}

fn to_range((start, end): (NaiveDate, NaiveDate)) -> DateRange {
    // Built from days walked in order, so start <= end.
    DateRange::new(start, end).unwrap_or_else(|_| DateRange::single(start))
}

/// Ordered union of `stored` and `fetched` restricted to `symbol` and `range`.
///
/// On a date present in both, the stored record wins.
pub fn merge(
    symbol: &str,
    range: DateRange,
    stored: Vec<PriceRecord>,
    fetched: Vec<PriceRecord>,
) -> Vec<PriceRecord> {
    let mut by_date = BTreeMap::new();
    for record in stored.into_iter().chain(fetched) {
        if record.symbol != symbol || !range.contains(record.date) {
            continue;
        }
        by_date.entry(record.date).or_insert(record);
    }
    by_date.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn range(a: u32, b: u32) -> DateRange {
        DateRange::new(day(a), day(b)).unwrap()
    }

    fn record(symbol: &str, d: u32, price: i64) -> PriceRecord {
        PriceRecord::new(symbol, day(d), Decimal::new(price, 2), "TRY")
    }

    #[test]
    fn test_empty_store_is_one_gap() {
        let gaps = missing_ranges(range(1, 10), &[], &BTreeSet::new());
        assert_eq!(gaps, vec![range(1, 10)]);
    }

    #[test]
    fn test_gaps_between_present_days() {
        let present = BTreeSet::from([day(1), day(3), day(5)]);
        let gaps = missing_ranges(range(1, 5), &[], &present);
        assert_eq!(gaps, vec![range(2, 2), range(4, 4)]);
    }

    #[test]
    fn test_adjacent_missing_days_are_coalesced() {
        let present = BTreeSet::from([day(4)]);
        let gaps = missing_ranges(range(1, 10), &[], &present);
        assert_eq!(gaps, vec![range(1, 3), range(5, 10)]);
    }

    #[test]
    fn test_coverage_marks_hold_days_without_records() {
        // Weekend inside a fetched range has no records but is not a gap
        let present = BTreeSet::from([day(2), day(3), day(5)]);
        let covered = vec![range(1, 6)];
        assert!(missing_ranges(range(1, 6), &covered, &present).is_empty());

        // Only the tail past the mark is missing
        let gaps = missing_ranges(range(1, 10), &covered, &present);
        assert_eq!(gaps, vec![range(7, 10)]);
    }

    #[test]
    fn test_merge_orders_and_prefers_stored() {
        let stored = vec![record("ABC", 5, 500), record("ABC", 2, 200)];
        let fetched = vec![
            record("ABC", 3, 300),
            record("ABC", 2, 999),
            record("ABC", 12, 1200),
            record("XYZ", 4, 400),
        ];

        let merged = merge("ABC", range(1, 10), stored, fetched);
        let dates: Vec<_> = merged.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2), day(3), day(5)]);
        assert_eq!(merged[0].price, Decimal::new(200, 2));
    }
}
