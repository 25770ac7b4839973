//! Currency conversion abstractions

use crate::core::record::{ConversionRate, DateRange};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait RateSource: Send + Sync {
    /// Daily `from` -> `to` rates within `range`. An unknown pair yields no rates.
    async fn fetch_rates(&self, from: &str, to: &str, range: DateRange)
    -> Result<Vec<ConversionRate>>;
}

/// Cache key of an exact-date rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateKey {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
}

impl RateKey {
    pub fn new(from: &str, to: &str, date: NaiveDate) -> Self {
        Self {
            from: from.to_uppercase(),
            to: to.to_uppercase(),
            date,
        }
    }
}
