//! Per-date currency conversion of price records
//!
//! Rates are resolved with a bounded nearest-prior-date policy: the rate of
//! the record's own date wins, and only days the source has been asked about
//! and had no rate for are skipped over, at most `lookback_days` back.

use crate::core::{
    Cache, ConversionRate, DateRange, FundDataError, PriceRecord, RateKey, RateSource, Today,
};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Cached knowledge about one day: `Some` is an exact rate, `None` a settled
/// day the source had no rate for.
pub type RateCache = dyn Cache<RateKey, Option<Decimal>>;

enum Resolved {
    Found(Decimal),
    /// A day in the window has never been asked for
    Unknown,
    /// Every day in the window is known to have no rate
    Missing,
}

/// Answers from a single source load, keyed by day
type Loaded = BTreeMap<NaiveDate, Option<Decimal>>;

pub struct RateConverter {
    source: Arc<dyn RateSource>,
    cache: Arc<RateCache>,
    lookback_days: u32,
    today: Today,
}

pub fn same_currency(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl RateConverter {
    pub fn new(
        source: Arc<dyn RateSource>,
        cache: Arc<RateCache>,
        lookback_days: u32,
        today: Today,
    ) -> Self {
        Self {
            source,
            cache,
            lookback_days,
            today,
        }
    }

    /// Factor turning a `from` amount on `date` into `to`.
    pub async fn rate(
        &self,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Decimal, FundDataError> {
        if same_currency(from, to) {
            return Ok(Decimal::ONE);
        }
        if let Resolved::Found(factor) = self.resolve(from, to, date, &Loaded::new()).await {
            return Ok(factor);
        }
        let loaded = self.load(from, to, self.window(date, date)).await?;
        match self.resolve(from, to, date, &loaded).await {
            Resolved::Found(factor) => Ok(factor),
            Resolved::Unknown | Resolved::Missing => Err(unsupported(from, to, date)),
        }
    }

    /// Converts every record into `to` using the rate of the record's own date.
    ///
    /// Fails as a whole if any record cannot be converted.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn convert(
        &self,
        records: Vec<PriceRecord>,
        to: &str,
    ) -> Result<Vec<PriceRecord>, FundDataError> {
        let pairs: BTreeSet<String> = records
            .iter()
            .filter(|r| !same_currency(&r.currency, to))
            .map(|r| r.currency.to_uppercase())
            .collect();

        // One source round-trip per currency pair for all unresolved dates
        let mut loaded: HashMap<String, Loaded> = HashMap::new();
        for from in &pairs {
            let mut unresolved = Vec::new();
            for record in records.iter().filter(|r| r.currency.eq_ignore_ascii_case(from)) {
                if let Resolved::Unknown = self.resolve(from, to, record.date, &Loaded::new()).await
                {
                    unresolved.push(record.date);
                }
            }
            if let (Some(first), Some(last)) =
                (unresolved.iter().min().copied(), unresolved.iter().max().copied())
            {
                let fresh = self.load(from, to, self.window(first, last)).await?;
                loaded.insert(from.clone(), fresh);
            }
        }

        let none_loaded = Loaded::new();
        let mut converted = Vec::with_capacity(records.len());
        for record in records {
            if same_currency(&record.currency, to) {
                converted.push(record);
                continue;
            }
            let fresh = loaded
                .get(&record.currency.to_uppercase())
                .unwrap_or(&none_loaded);
            let factor = match self.resolve(&record.currency, to, record.date, fresh).await {
                Resolved::Found(factor) => factor,
                Resolved::Unknown | Resolved::Missing => {
                    return Err(unsupported(&record.currency, to, record.date));
                }
            };
            converted.push(PriceRecord {
                price: record.price * factor,
                currency: to.to_uppercase(),
                ..record
            });
        }
        Ok(converted)
    }

    fn window(&self, first: NaiveDate, last: NaiveDate) -> DateRange {
        let start = first - Duration::days(i64::from(self.lookback_days));
        DateRange::new(start, last).unwrap_or_else(|_| DateRange::single(last))
    }

    /// Walks back from `date`, preferring `fresh` answers over cached ones.
    async fn resolve(&self, from: &str, to: &str, date: NaiveDate, fresh: &Loaded) -> Resolved {
        for back in 0..=i64::from(self.lookback_days) {
            let day = date - Duration::days(back);
            let known = match fresh.get(&day) {
                Some(known) => Some(*known),
                None => self.cache.get(&RateKey::new(from, to, day)).await,
            };
            match known {
                Some(Some(factor)) => return Resolved::Found(factor),
                Some(None) => continue,
                None => return Resolved::Unknown,
            }
        }
        Resolved::Missing
    }

    /// Asks the source for `window` and returns what it knows about every day.
    ///
    /// Only days that are over get cached; a rate for today may still move.
    async fn load(&self, from: &str, to: &str, window: DateRange) -> Result<Loaded, FundDataError> {
        debug!("Loading {}->{} rates for {}", from, to, window);
        let rates: Vec<ConversionRate> = self
            .source
            .fetch_rates(from, to, window)
            .await
            .map_err(|source| FundDataError::RateSourceUnavailable {
                from: from.to_uppercase(),
                to: to.to_uppercase(),
                source,
            })?;

        let today = (self.today)();
        let mut fresh = Loaded::new();
        for day in window.days() {
            let factor = rates.iter().find(|r| r.date == day).map(|r| r.factor);
            if day < today {
                self.cache.put(RateKey::new(from, to, day), factor).await;
                fresh.insert(day, factor);
            } else if factor.is_some() {
                fresh.insert(day, factor);
            }
        }
        Ok(fresh)
    }
}

fn unsupported(from: &str, to: &str, date: NaiveDate) -> FundDataError {
    FundDataError::UnsupportedCurrency {
        from: from.to_uppercase(),
        to: to.to_uppercase(),
        date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCache;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn far_future() -> NaiveDate {
        NaiveDate::from_ymd_opt(2100, 1, 1).unwrap()
    }

    /// Serves fixed TRY->USD rates and records every requested window
    struct FixedRates {
        rates: Vec<(NaiveDate, Decimal)>,
        calls: Mutex<Vec<DateRange>>,
        fail: bool,
    }

    impl FixedRates {
        fn new(rates: Vec<(NaiveDate, Decimal)>) -> Self {
            Self {
                rates,
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn calls(&self) -> Vec<DateRange> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RateSource for FixedRates {
        async fn fetch_rates(
            &self,
            from: &str,
            to: &str,
            range: DateRange,
        ) -> Result<Vec<ConversionRate>> {
            self.calls.lock().unwrap().push(range);
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            if from != "TRY" || to != "USD" {
                return Ok(Vec::new());
            }
            Ok(self
                .rates
                .iter()
                .filter(|(d, _)| range.contains(*d))
                .map(|(d, f)| ConversionRate {
                    base: from.to_string(),
                    currency: to.to_string(),
                    date: *d,
                    factor: *f,
                })
                .collect())
        }
    }

    fn converter(source: Arc<FixedRates>) -> RateConverter {
        let cache = Arc::new(MemoryCache::<RateKey, Option<Decimal>>::new());
        RateConverter::new(source, cache, 5, far_future)
    }

    fn try_record(d: u32, price: i64) -> PriceRecord {
        PriceRecord::new("ABC", day(d), Decimal::new(price, 2), "TRY")
    }

    #[tokio::test]
    async fn test_identity_conversion_skips_source() {
        let source = Arc::new(FixedRates::new(vec![]));
        let converter = converter(source.clone());

        assert_eq!(converter.rate("TRY", "try", day(2)).await.unwrap(), Decimal::ONE);

        let records = vec![try_record(2, 150), try_record(3, 160)];
        let converted = converter.convert(records.clone(), "TRY").await.unwrap();
        assert_eq!(converted, records);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_convert_uses_each_record_date() {
        let source = Arc::new(FixedRates::new(vec![
            (day(2), Decimal::new(50, 3)),
            (day(3), Decimal::new(40, 3)),
        ]));
        let converter = converter(source.clone());

        let converted = converter
            .convert(vec![try_record(2, 1000), try_record(3, 1000)], "USD")
            .await
            .unwrap();

        assert_eq!(converted[0].price, Decimal::new(50, 2));
        assert_eq!(converted[1].price, Decimal::new(40, 2));
        assert!(converted.iter().all(|r| r.currency == "USD"));

        // Both dates were loaded with a single request
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_weekend_falls_back_to_prior_rate() {
        // Friday the 6th has a rate, the weekend does not
        let source = Arc::new(FixedRates::new(vec![(day(6), Decimal::new(5, 2))]));
        let converter = converter(source.clone());

        assert_eq!(
            converter.rate("TRY", "USD", day(8)).await.unwrap(),
            Decimal::new(5, 2)
        );

        // Settled knowledge is reused without another request
        assert_eq!(
            converter.rate("TRY", "USD", day(7)).await.unwrap(),
            Decimal::new(5, 2)
        );
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unasked_day_is_not_served_from_prior_rate() {
        let source = Arc::new(FixedRates::new(vec![
            (day(2), Decimal::new(5, 2)),
            (day(3), Decimal::new(6, 2)),
        ]));
        let converter = converter(source.clone());

        converter.rate("TRY", "USD", day(2)).await.unwrap();
        // The 3rd was never asked for, so its own rate is loaded
        assert_eq!(
            converter.rate("TRY", "USD", day(3)).await.unwrap(),
            Decimal::new(6, 2)
        );
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_no_rate_within_lookback_is_unsupported() {
        let source = Arc::new(FixedRates::new(vec![(day(1), Decimal::new(5, 2))]));
        let converter = converter(source);

        let result = converter.rate("TRY", "USD", day(20)).await;
        assert!(matches!(
            result,
            Err(FundDataError::UnsupportedCurrency { ref from, ref to, date })
                if from == "TRY" && to == "USD" && date == day(20)
        ));
    }

    #[tokio::test]
    async fn test_unknown_pair_is_unsupported() {
        let source = Arc::new(FixedRates::new(vec![(day(2), Decimal::new(5, 2))]));
        let converter = converter(source);

        let mut record = try_record(2, 100);
        record.currency = "EUR".to_string();
        let result = converter.convert(vec![record], "USD").await;
        assert!(matches!(
            result,
            Err(FundDataError::UnsupportedCurrency { .. })
        ));
    }

    #[tokio::test]
    async fn test_source_failure_is_reported() {
        let mut fixed = FixedRates::new(vec![]);
        fixed.fail = true;
        let converter = converter(Arc::new(fixed));

        let result = converter.rate("TRY", "USD", day(2)).await;
        assert!(matches!(
            result,
            Err(FundDataError::RateSourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_today_without_rate_is_asked_again() {
        fn today() -> NaiveDate {
            NaiveDate::from_ymd_opt(2023, 1, 9).unwrap()
        }
        let source = Arc::new(FixedRates::new(vec![(day(6), Decimal::new(5, 2))]));
        let cache = Arc::new(MemoryCache::<RateKey, Option<Decimal>>::new());
        let converter = RateConverter::new(source.clone(), cache, 5, today);

        // Today's rate is not published yet; the prior one is not used silently
        assert!(converter.rate("TRY", "USD", day(9)).await.is_err());
        assert!(converter.rate("TRY", "USD", day(9)).await.is_err());
        assert_eq!(source.calls().len(), 2);
    }

    /// Serves a provisional rate for the 9th first and the settled close afterwards
    struct MovingRates {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl RateSource for MovingRates {
        async fn fetch_rates(
            &self,
            from: &str,
            to: &str,
            _range: DateRange,
        ) -> Result<Vec<ConversionRate>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let factor = if *calls == 1 {
                Decimal::new(5, 2)
            } else {
                Decimal::new(6, 2)
            };
            Ok(vec![ConversionRate {
                base: from.to_string(),
                currency: to.to_string(),
                date: day(9),
                factor,
            }])
        }
    }

    #[tokio::test]
    async fn test_today_rate_is_not_cached() {
        fn today() -> NaiveDate {
            NaiveDate::from_ymd_opt(2023, 1, 9).unwrap()
        }
        let source = Arc::new(MovingRates {
            calls: Mutex::new(0),
        });
        let cache = Arc::new(MemoryCache::<RateKey, Option<Decimal>>::new());
        let converter = RateConverter::new(source.clone(), cache.clone(), 5, today);

        assert_eq!(
            converter.rate("TRY", "USD", day(9)).await.unwrap(),
            Decimal::new(5, 2)
        );
        assert_eq!(cache.get(&RateKey::new("TRY", "USD", day(9))).await, None);

        // The day is not over, so the newer close is picked up
        assert_eq!(
            converter.rate("TRY", "USD", day(9)).await.unwrap(),
            Decimal::new(6, 2)
        );
        let converted = converter
            .convert(vec![try_record(9, 1000)], "USD")
            .await
            .unwrap();
        assert_eq!(converted[0].price, Decimal::new(60, 2));
        assert_eq!(*source.calls.lock().unwrap(), 3);
    }
}
