use crate::core::cache::Cache;
use crate::core::error::StoreError;
use crate::core::record::{DateRange, PriceRecord};
use crate::core::store::RecordStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashSet;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

const PRICES_PARTITION: &str = "prices";
const COVERAGE_PARTITION: &str = "coverage";

fn record_key(symbol: &str, date: NaiveDate) -> Vec<u8> {
    // ISO dates sort lexicographically in date order
    format!("{symbol}\0{date}").into_bytes()
}

fn symbol_prefix(symbol: &str) -> Vec<u8> {
    format!("{symbol}\0").into_bytes()
}

/// Record store on top of a fjall keyspace.
pub struct FjallRecordStore {
    keyspace: Keyspace,
    prices: PartitionHandle,
    coverage: PartitionHandle,
    // Serializes check-then-insert so concurrent fills never overwrite
    write_lock: Mutex<()>,
}

impl FjallRecordStore {
    pub fn new(keyspace: Keyspace) -> Result<Self, StoreError> {
        let prices = keyspace.open_partition(PRICES_PARTITION, PartitionCreateOptions::default())?;
        let coverage =
            keyspace.open_partition(COVERAGE_PARTITION, PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            prices,
            coverage,
            write_lock: Mutex::new(()),
        })
    }

    fn write(
        &self,
        covered: Option<(&str, DateRange)>,
        records: &[PriceRecord],
    ) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut batch = self.keyspace.batch();
        let mut seen = HashSet::new();
        for record in records {
            let key = record_key(&record.symbol, record.date);
            if self.prices.contains_key(&key)? || !seen.insert(key.clone()) {
                continue;
            }
            batch.insert(&self.prices, key, serde_json::to_vec(record)?);
        }
        if let Some((symbol, range)) = covered {
            batch.insert(
                &self.coverage,
                record_key(symbol, range.start()),
                serde_json::to_vec(&range)?,
            );
        }

        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(inserted = seen.len(), "Committed record batch");
        Ok(seen.len())
    }
}

#[async_trait]
impl RecordStore for FjallRecordStore {
    async fn query(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError> {
        let from = record_key(symbol, range.start());
        let to = record_key(symbol, range.end());

        let mut records = Vec::new();
        for item in self.prices.range(from..=to) {
            let (_, value) = item?;
            records.push(serde_json::from_slice::<PriceRecord>(&value)?);
        }
        debug!(symbol, %range, found = records.len(), "Queried stored records");
        Ok(records)
    }

    async fn save(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        self.write(None, records)
    }

    async fn covered(&self, symbol: &str, range: DateRange) -> Result<Vec<DateRange>, StoreError> {
        let mut marks = Vec::new();
        for item in self.coverage.prefix(symbol_prefix(symbol)) {
            let (_, value) = item?;
            let mark: DateRange = serde_json::from_slice(&value)?;
            if mark.overlaps(&range) {
                marks.push(mark);
            }
        }
        Ok(marks)
    }

    async fn fill(
        &self,
        symbol: &str,
        covered: Option<DateRange>,
        records: &[PriceRecord],
    ) -> Result<usize, StoreError> {
        self.write(covered.map(|range| (symbol, range)), records)
    }
}

/// Persistent cache stored as JSON in a fjall partition.
pub struct FjallCache<K, V> {
    partition: PartitionHandle,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> FjallCache<K, V> {
    pub fn new(keyspace: &Keyspace, name: &str) -> Result<Self, StoreError> {
        let partition = keyspace.open_partition(name, PartitionCreateOptions::default())?;
        Ok(Self {
            partition,
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for FjallCache<K, V>
where
    K: Send + Sync + Serialize + Debug + 'static,
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        let res: Result<Option<V>, StoreError> = (|| {
            if let Some(value) = self.partition.get(serde_json::to_vec(key)?)? {
                debug!("Cache HIT for key: {:?}", key);
                return Ok(Some(serde_json::from_slice(&value)?));
            }
            debug!("Cache MISS for key: {:?}", key);
            Ok(None)
        })();

        match res {
            Ok(val) => val,
            Err(e) => {
                debug!("FjallCache get error: {}", e);
                None
            }
        }
    }

    async fn put(&self, key: K, value: V) {
        let res: Result<(), StoreError> = (|| {
            self.partition
                .insert(serde_json::to_vec(&key)?, serde_json::to_vec(&value)?)?;
            debug!("Cache PUT for key: {:?}", key);
            Ok(())
        })();
        if let Err(e) = res {
            debug!("FjallCache put error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::RateKey;
    use crate::store::open_keyspace;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn record(symbol: &str, d: u32, price: i64) -> PriceRecord {
        PriceRecord::new(symbol, day(d), Decimal::new(price, 2), "TRY")
    }

    #[tokio::test]
    async fn test_query_returns_range_in_date_order() {
        let dir = tempdir().unwrap();
        let store = FjallRecordStore::new(open_keyspace(dir.path()).unwrap()).unwrap();

        store
            .save(&[
                record("ABC", 9, 900),
                record("ABC", 2, 200),
                record("ABC", 5, 500),
                record("ABD", 3, 300),
            ])
            .await
            .unwrap();

        let range = DateRange::new(day(2), day(8)).unwrap();
        let records = store.query("ABC", range).await.unwrap();
        let dates: Vec<_> = records.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(2), day(5)]);
        assert!(records.iter().all(|r| r.symbol == "ABC"));
    }

    #[tokio::test]
    async fn test_save_is_idempotent_and_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = FjallRecordStore::new(open_keyspace(dir.path()).unwrap()).unwrap();
        let range = DateRange::new(day(1), day(10)).unwrap();

        assert_eq!(store.save(&[record("ABC", 2, 200)]).await.unwrap(), 1);
        let before = store.query("ABC", range).await.unwrap();

        assert_eq!(store.save(&[record("ABC", 2, 200)]).await.unwrap(), 0);
        assert_eq!(store.save(&[record("ABC", 2, 777)]).await.unwrap(), 0);
        assert_eq!(store.query("ABC", range).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_fill_writes_records_and_coverage_together() {
        let dir = tempdir().unwrap();
        let store = FjallRecordStore::new(open_keyspace(dir.path()).unwrap()).unwrap();
        let gap = DateRange::new(day(1), day(7)).unwrap();

        let inserted = store
            .fill("ABC", Some(gap), &[record("ABC", 2, 200), record("ABC", 3, 300)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let probe = DateRange::new(day(5), day(20)).unwrap();
        assert_eq!(store.covered("ABC", probe).await.unwrap(), vec![gap]);
        assert!(store.covered("XYZ", probe).await.unwrap().is_empty());

        let later = DateRange::new(day(8), day(20)).unwrap();
        assert!(store.covered("ABC", later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let range = DateRange::new(day(1), day(10)).unwrap();
        {
            let store = FjallRecordStore::new(open_keyspace(dir.path()).unwrap()).unwrap();
            store
                .fill("ABC", Some(range), &[record("ABC", 3, 300)])
                .await
                .unwrap();
        }

        let store = FjallRecordStore::new(open_keyspace(dir.path()).unwrap()).unwrap();
        assert_eq!(
            store.query("ABC", range).await.unwrap(),
            vec![record("ABC", 3, 300)]
        );
        assert_eq!(store.covered("ABC", range).await.unwrap(), vec![range]);
    }

    #[tokio::test]
    async fn test_fjall_cache_get_put() {
        let dir = tempdir().unwrap();
        let keyspace = open_keyspace(dir.path()).unwrap();
        let cache = FjallCache::<RateKey, Option<Decimal>>::new(&keyspace, "rates").unwrap();
        let key = RateKey::new("try", "usd", day(2));

        // Initially, cache is empty
        assert!(cache.get(&key).await.is_none());

        cache.put(key.clone(), Some(Decimal::new(53, 3))).await;
        assert_eq!(cache.get(&key).await, Some(Some(Decimal::new(53, 3))));

        // A known absence is cached distinctly from a miss
        let weekend = RateKey::new("TRY", "USD", day(1));
        cache.put(weekend.clone(), None).await;
        assert_eq!(cache.get(&weekend).await, Some(None));
    }
}
