use super::util::{http_client, with_retry};
use crate::core::config::RetryConfig;
use crate::core::{DateRange, PriceRecord, UpstreamFetcher};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

const HISTORY_ENDPOINT: &str = "/api/DB/BindHistoryInfo";
const NATIVE_CURRENCY: &str = "TRY";
// TEFAS reports day boundaries in Turkey time, which has no DST
const TEFAS_UTC_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Deserialize)]
struct TefasResponse {
    #[serde(default)]
    data: Vec<TefasRow>,
}

#[derive(Debug, Deserialize)]
struct TefasRow {
    #[serde(rename = "TARIH")]
    date_ms: String,
    #[serde(rename = "FONKODU")]
    symbol: String,
    #[serde(rename = "FIYAT")]
    price: Decimal,
}

/// Fetches daily fund prices from the TEFAS history endpoint.
pub struct TefasFetcher {
    base_url: String,
    max_days_per_request: u32,
    retry: RetryConfig,
    client: reqwest::Client,
}

impl TefasFetcher {
    pub fn new(base_url: &str, max_days_per_request: u32, retry: RetryConfig) -> Result<Self> {
        let client = http_client(&retry).context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            max_days_per_request,
            retry,
            client,
        })
    }

    fn parse_day(date_ms: &str) -> Result<NaiveDate> {
        let millis: i64 = date_ms
            .trim()
            .parse()
            .with_context(|| format!("Invalid TARIH value: '{date_ms}'"))?;
        let offset = FixedOffset::east_opt(TEFAS_UTC_OFFSET_SECS)
            .ok_or_else(|| anyhow!("Invalid TEFAS UTC offset"))?;
        let instant = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| anyhow!("TARIH out of range: {millis}"))?;
        Ok(instant.with_timezone(&offset).date_naive())
    }

    async fn fetch_chunk(&self, symbol: &str, chunk: DateRange) -> Result<Vec<PriceRecord>> {
        let url = format!("{}{}", self.base_url, HISTORY_ENDPOINT);
        let start = chunk.start().format("%d.%m.%Y").to_string();
        let end = chunk.end().format("%d.%m.%Y").to_string();
        let form = [
            ("fontip", "YAT"),
            ("sfontur", ""),
            ("fonkod", symbol),
            ("fongrup", ""),
            ("bastarih", start.as_str()),
            ("bittarih", end.as_str()),
            ("fonturkod", ""),
            ("fonunvantip", ""),
        ];
        debug!("Requesting {} history for {} from {}", symbol, chunk, url);

        let response = with_retry(
            || async {
                self.client
                    .post(&url)
                    .form(&form)
                    .send()
                    .await?
                    .error_for_status()
            },
            &self.retry,
        )
        .await
        .with_context(|| format!("Failed to send request for {symbol} over {chunk}"))?;

        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for {symbol}"))?;

        if response_text.trim().is_empty() {
            return Err(anyhow!("Received empty response for {} over {}", symbol, chunk));
        }

        let parsed: TefasResponse = serde_json::from_str(&response_text).with_context(|| {
            format!("Failed to parse TEFAS response for {symbol}. Response: '{response_text}'")
        })?;

        let mut records = Vec::with_capacity(parsed.data.len());
        for row in parsed.data {
            if row.price.is_zero() {
                debug!("Skipping zero price row for {} at {}", row.symbol, row.date_ms);
                continue;
            }
            let date = Self::parse_day(&row.date_ms)?;
            if !row.symbol.eq_ignore_ascii_case(symbol) {
                warn!("Ignoring row for unexpected symbol {}", row.symbol);
                continue;
            }
            records.push(PriceRecord::new(symbol, date, row.price, NATIVE_CURRENCY));
        }
        Ok(records)
    }
}

#[async_trait]
impl UpstreamFetcher for TefasFetcher {
    #[instrument(name = "TefasFetch", skip(self), fields(symbol = %symbol, range = %range))]
    async fn fetch(&self, symbol: &str, range: DateRange) -> Result<Vec<PriceRecord>> {
        let mut records = Vec::new();
        for chunk in range.chunks(self.max_days_per_request) {
            records.extend(self.fetch_chunk(symbol, chunk).await?);
        }
        records.sort_by_key(|r| r.date);
        records.dedup_by_key(|r| r.date);
        debug!("Fetched {} records", records.len());
        Ok(records)
    }
}
