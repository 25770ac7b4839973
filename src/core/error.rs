//! Error taxonomy of the fund data core

use crate::core::record::DateRange;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FundDataError {
    /// Remote source unreachable or erroring after its retries
    #[error("upstream unavailable for {symbol} over {range}")]
    UpstreamUnavailable {
        symbol: String,
        range: DateRange,
        #[source]
        source: anyhow::Error,
    },

    /// Rate source unreachable while converting
    #[error("rate source unavailable for {from}->{to}")]
    RateSourceUnavailable {
        from: String,
        to: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store error")]
    Store(#[from] StoreError),

    #[error("no {from}->{to} conversion rate available for {date}")]
    UnsupportedCurrency {
        from: String,
        to: String,
        date: NaiveDate,
    },

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage engine failure: {0}")]
    Engine(#[from] fjall::Error),

    #[error("failed to encode or decode a stored value: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("failed to prepare store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Unavailable(String),
}
