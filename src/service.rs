//! Cache-in-front-of-upstream retrieval of fund price series

use crate::converter::RateConverter;
use crate::core::{
    DateRange, FundDataError, FundSeries, PriceRecord, RecordStore, Today, UpstreamFetcher,
    utc_today,
};
use crate::gaps;
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

pub struct FundDataService {
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn UpstreamFetcher>,
    converter: RateConverter,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    today: Today,
}

impl FundDataService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
        converter: RateConverter,
    ) -> Self {
        Self {
            store,
            fetcher,
            converter,
            in_flight: Mutex::new(HashMap::new()),
            today: utc_today,
        }
    }

    /// Overrides the clock deciding which days count as settled.
    pub fn with_today(mut self, today: Today) -> Self {
        self.today = today;
        self
    }

    /// Returns the ordered price series of `symbol` over `range` in `currency`.
    ///
    /// Days missing from the store are fetched from upstream and persisted
    /// before anything is returned.
    #[instrument(skip(self), fields(range = %range))]
    pub async fn get_and_save_fund_data(
        &self,
        symbol: &str,
        currency: &str,
        range: DateRange,
    ) -> Result<FundSeries, FundDataError> {
        let symbol_lock = self.symbol_lock(symbol).await;
        let filled = {
            let _guard = symbol_lock.lock().await;
            self.load_or_fill(symbol, range).await
        };
        self.release(symbol, symbol_lock).await;
        let records = filled?;

        let records = self.converter.convert(records, currency).await?;
        Ok(FundSeries {
            symbol: symbol.to_string(),
            currency: currency.to_uppercase(),
            range,
            records,
        })
    }

    async fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(symbol.to_string()).or_default())
    }

    /// Drops the symbol's lock once no other request holds or awaits it.
    async fn release(&self, symbol: &str, symbol_lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // One reference in the map and ours
        if Arc::strong_count(&symbol_lock) == 2 {
            in_flight.remove(symbol);
        }
    }

    async fn load_or_fill(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<PriceRecord>, FundDataError> {
        let stored = self.store.query(symbol, range).await?;
        let covered = self.store.covered(symbol, range).await?;
        let present: BTreeSet<_> = stored.iter().map(|r| r.date).collect();

        let missing = gaps::missing_ranges(range, &covered, &present);
        if missing.is_empty() {
            debug!("Cache HIT for {} over {}", symbol, range);
            return Ok(stored);
        }
        debug!("Fetching {} gap(s) for {}", missing.len(), symbol);

        // Nothing is written unless every gap was fetched
        let fills = try_join_all(missing.iter().map(|gap| self.fetch_gap(symbol, *gap))).await?;

        let today = (self.today)();
        let mut fetched = Vec::new();
        for (gap, records) in fills {
            let inserted = self
                .store
                .fill(symbol, gap.clip_before(today), &records)
                .await?;
            debug!("Stored {} new record(s) for gap {}", inserted, gap);
            fetched.extend(records);
        }

        let merged = gaps::merge(symbol, range, stored, fetched);
        info!("Served {} record(s) for {} over {}", merged.len(), symbol, range);
        Ok(merged)
    }

    async fn fetch_gap(
        &self,
        symbol: &str,
        gap: DateRange,
    ) -> Result<(DateRange, Vec<PriceRecord>), FundDataError> {
        let records = self.fetcher.fetch(symbol, gap).await.map_err(|source| {
            FundDataError::UpstreamUnavailable {
                symbol: symbol.to_string(),
                range: gap,
                source,
            }
        })?;
        let records = records
            .into_iter()
            .filter(|r| r.symbol == symbol && gap.contains(r.date))
            .collect();
        Ok((gap, records))
    }
}
