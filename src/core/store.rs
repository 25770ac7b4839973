//! Persistence abstraction for fund price records

use crate::core::error::StoreError;
use crate::core::record::{DateRange, PriceRecord};
use async_trait::async_trait;

/// Durable home of fund price records, keyed by (symbol, date).
///
/// Stored records are authoritative: inserting a record for a (symbol, date)
/// that already exists is a no-op, never an overwrite.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records of `symbol` inside `range`, ascending by date.
    async fn query(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceRecord>, StoreError>;

    /// Idempotent insert. Returns how many records were new.
    async fn save(&self, records: &[PriceRecord]) -> Result<usize, StoreError>;

    /// Ranges of `symbol` already fetched from upstream that overlap `range`.
    async fn covered(&self, symbol: &str, range: DateRange) -> Result<Vec<DateRange>, StoreError>;

    /// Atomically inserts `records` and marks `covered` as fetched.
    ///
    /// Either every new record and the mark become visible, or none do.
    async fn fill(
        &self,
        symbol: &str,
        covered: Option<DateRange>,
        records: &[PriceRecord],
    ) -> Result<usize, StoreError>;
}
