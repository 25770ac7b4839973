//! Upstream price source abstraction

use crate::core::record::{DateRange, PriceRecord};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Raw records of `symbol` in `range`. Non-trading days have no record.
    async fn fetch(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceRecord>>;
}
