use super::util::{http_client, with_retry};
use crate::core::config::RetryConfig;
use crate::core::{ConversionRate, DateRange, RateSource};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Debug, Deserialize)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<Decimal>>>,
}

/// Historical daily exchange rates from the Yahoo Finance chart API.
pub struct YahooRateSource {
    base_url: String,
    retry: RetryConfig,
    client: reqwest::Client,
}

impl YahooRateSource {
    pub fn new(base_url: &str, retry: RetryConfig) -> Result<Self> {
        let client = http_client(&retry).context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            client,
        })
    }

    fn extract_rates(from: &str, to: &str, item: ChartItem) -> Vec<ConversionRate> {
        let offset = item.meta.gmtoffset;
        let (Some(timestamps), Some(closes)) = (
            item.timestamp,
            item.indicators
                .and_then(|inds| inds.quote.into_iter().next())
                .and_then(|q| q.close),
        ) else {
            return Vec::new();
        };

        timestamps
            .into_iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
                let factor = close?;
                (factor > Decimal::ZERO).then(|| ConversionRate {
                    base: from.to_string(),
                    currency: to.to_string(),
                    date,
                    factor,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RateSource for YahooRateSource {
    #[instrument(name = "YahooRateFetch", skip(self), fields(pair = %format!("{from}{to}"), range = %range))]
    async fn fetch_rates(
        &self,
        from: &str,
        to: &str,
        range: DateRange,
    ) -> Result<Vec<ConversionRate>> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        let symbol = format!("{from}{to}=X");
        let period1 = range.start().and_time(NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive
        let period2 = range.end().and_time(NaiveTime::MIN).and_utc().timestamp() + 86_400;
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url, symbol, period1, period2
        );
        debug!("Requesting currency rates from {}", url);

        let response = with_retry(
            || async {
                match self.client.get(&url).send().await {
                    // Unknown pairs are a 404 and not worth retrying
                    Ok(response) if response.status() == StatusCode::NOT_FOUND => Ok(None),
                    Ok(response) => response.error_for_status().map(Some),
                    Err(e) => Err(e),
                }
            },
            &self.retry,
        )
        .await
        .with_context(|| format!("Request error for currency pair: {symbol}"))?;

        let Some(response) = response else {
            debug!("Unknown currency pair: {}", symbol);
            return Ok(Vec::new());
        };

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let rates: Vec<_> = data
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|item| Self::extract_rates(&from, &to, item))
            .unwrap_or_default();
        debug!("Received {} rates for {}", rates.len(), symbol);
        Ok(rates)
    }
}
