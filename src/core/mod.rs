//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod log;
pub mod rate;
pub mod record;
pub mod store;

// Re-export main types for cleaner imports
pub use cache::Cache;
pub use error::{FundDataError, StoreError};
pub use fetcher::UpstreamFetcher;
pub use rate::{RateKey, RateSource};
pub use record::{ConversionRate, DateRange, FundSeries, PriceRecord};
pub use store::RecordStore;

use chrono::{NaiveDate, Utc};

/// Source of the current calendar day, swappable in tests.
pub type Today = fn() -> NaiveDate;

pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}
