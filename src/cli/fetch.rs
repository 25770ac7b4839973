use super::ui;
use crate::core::DateRange;
use crate::core::config::AppConfig;
use crate::output::{self, OutputFormat};
use crate::service::FundDataService;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MIN_SYMBOL_LEN: usize = 3;

/// Raw `fetch` arguments as typed by the user
#[derive(Debug, Clone)]
pub struct FetchArgs {
    pub symbol: String,
    pub start: String,
    pub end: Option<String>,
    pub currency: Option<String>,
    pub format: OutputFormat,
}

/// A validated fund data request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub currency: String,
    pub range: DateRange,
}

fn parse_date(value: &str, name: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .with_context(|| format!("{name} date must be in YYYY-MM-DD format, got '{value}'"))
}

/// Normalizes and checks the arguments; `end` defaults to `today`.
pub fn validate(args: &FetchArgs, config: &AppConfig, today: NaiveDate) -> Result<FetchRequest> {
    let symbol = args.symbol.trim().to_uppercase();
    if symbol.len() < MIN_SYMBOL_LEN {
        bail!("symbol must be at least {MIN_SYMBOL_LEN} characters");
    }

    let start = parse_date(&args.start, "start")?;
    let end = match &args.end {
        Some(end) => parse_date(end, "end")?,
        None => today,
    };
    let range = DateRange::new(start, end)?;

    let currency = args
        .currency
        .as_deref()
        .unwrap_or(&config.currency)
        .trim()
        .to_uppercase();
    if !config.is_supported_currency(&currency) {
        bail!(
            "currency must be one of {}",
            config.supported_currencies.join(", ")
        );
    }

    Ok(FetchRequest {
        symbol,
        currency,
        range,
    })
}

/// Serves the request through `service` and renders the series.
pub async fn run(
    service: &FundDataService,
    request: &FetchRequest,
    format: OutputFormat,
) -> Result<String> {
    info!(
        "Fetching {} in {} over {}",
        request.symbol, request.currency, request.range
    );

    let pb = ui::new_spinner(&format!("Fetching {}...", request.symbol));
    let series = service
        .get_and_save_fund_data(&request.symbol, &request.currency, request.range)
        .await;
    pb.finish_and_clear();

    let series =
        series.with_context(|| format!("Failed to get fund data for {}", request.symbol))?;
    output::render(&series, format)
}
