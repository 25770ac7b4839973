//! Fund price records and date ranges

use crate::core::error::FundDataError;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A single daily price of a fund, in the currency given by `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub price: Decimal,
    pub currency: String,
}

impl PriceRecord {
    pub fn new(symbol: &str, date: NaiveDate, price: Decimal, currency: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            date,
            price,
            currency: currency.to_string(),
        }
    }
}

/// Inclusive range of calendar days. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FundDataError> {
        if start > end {
            return Err(FundDataError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Number of days in the range, counting both ends.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    /// Splits the range into consecutive ranges of at most `max_days` days.
    pub fn chunks(&self, max_days: u32) -> Vec<DateRange> {
        let step = Duration::days(i64::from(max_days.max(1)) - 1);
        let mut chunks = Vec::new();
        let mut start = self.start;
        loop {
            let end = (start + step).min(self.end);
            chunks.push(DateRange { start, end });
            match end.succ_opt() {
                Some(next) if end < self.end => start = next,
                _ => break,
            }
        }
        chunks
    }

    /// The part of the range strictly before `day`, if any.
    pub fn clip_before(&self, day: NaiveDate) -> Option<DateRange> {
        let last = day.pred_opt()?;
        if last < self.start {
            return None;
        }
        Some(DateRange {
            start: self.start,
            end: self.end.min(last),
        })
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Ordered price series of one symbol over a requested range, in one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundSeries {
    pub symbol: String,
    pub currency: String,
    pub range: DateRange,
    pub records: Vec<PriceRecord>,
}

/// Exchange rate to turn a `base` amount into `currency` on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRate {
    pub base: String,
    pub currency: String,
    pub date: NaiveDate,
    pub factor: Decimal,
}
