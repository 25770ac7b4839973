use crate::core::cache::Cache;
use crate::core::error::StoreError;
use crate::core::record::{DateRange, PriceRecord};
use crate::core::store::RecordStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Records {
    prices: BTreeMap<(String, NaiveDate), PriceRecord>,
    coverage: HashMap<String, Vec<DateRange>>,
}

impl Records {
    fn insert_new(&mut self, records: &[PriceRecord]) -> usize {
        let mut inserted = 0;
        for record in records {
            let key = (record.symbol.clone(), record.date);
            if !self.prices.contains_key(&key) {
                self.prices.insert(key, record.clone());
                inserted += 1;
            }
        }
        inserted
    }
}

/// In-memory record store, lost when the process exits
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn query(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let from = (symbol.to_string(), range.start());
        let to = (symbol.to_string(), range.end());
        Ok(inner.prices.range(from..=to).map(|(_, r)| r.clone()).collect())
    }

    async fn save(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.insert_new(records))
    }

    async fn covered(&self, symbol: &str, range: DateRange) -> Result<Vec<DateRange>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .coverage
            .get(symbol)
            .map(|marks| marks.iter().filter(|m| m.overlaps(&range)).copied().collect())
            .unwrap_or_default())
    }

    async fn fill(
        &self,
        symbol: &str,
        covered: Option<DateRange>,
        records: &[PriceRecord],
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let inserted = inner.insert_new(records);
        if let Some(range) = covered {
            inner
                .coverage
                .entry(symbol.to_string())
                .or_default()
                .push(range);
        }
        debug!(symbol, inserted, "Filled memory store");
        Ok(inserted)
    }
}

/// In-memory cache implementation using HashMap and Mutex
pub struct MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.lock().await;
        let value = cache.get(key).cloned();
        if value.is_some() {
            debug!("Cache HIT for key: {:?}", key);
        } else {
            debug!("Cache MISS for key: {:?}", key);
        }
        value
    }

    async fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {:?}", key);
        cache.insert(key, value);
    }
}
