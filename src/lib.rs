pub mod cli;
pub mod converter;
pub mod core;
pub mod gaps;
pub mod output;
pub mod providers;
pub mod service;
pub mod store;

use crate::cli::fetch::{self, FetchArgs};
use crate::converter::RateConverter;
use crate::core::config::{AppConfig, ProvidersConfig};
use crate::core::{RateKey, utc_today};
use crate::providers::tefas::TefasFetcher;
use crate::providers::yahoo_finance::YahooRateSource;
use crate::service::FundDataService;
use crate::store::disk::{FjallCache, FjallRecordStore};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

const CACHE_DIR: &str = "cache";
const RATES_PARTITION: &str = "rates";

pub enum AppCommand {
    Fetch(FetchArgs),
}

/// Wires the disk store, rate cache and remote providers described by `config`.
pub fn build_service(config: &AppConfig) -> Result<FundDataService> {
    let defaults = ProvidersConfig::default();
    let tefas = config
        .providers
        .tefas
        .clone()
        .or(defaults.tefas)
        .context("Missing TEFAS provider configuration")?;
    let yahoo = config
        .providers
        .yahoo
        .clone()
        .or(defaults.yahoo)
        .context("Missing Yahoo provider configuration")?;

    let cache_path = config.default_data_path()?.join(CACHE_DIR);
    let keyspace = store::open_keyspace(&cache_path)
        .with_context(|| format!("Failed to open cache at {}", cache_path.display()))?;
    info!("Using cache at {}", cache_path.display());

    let record_store = Arc::new(FjallRecordStore::new(keyspace.clone())?);
    let rate_cache = Arc::new(FjallCache::<RateKey, Option<Decimal>>::new(
        &keyspace,
        RATES_PARTITION,
    )?);

    let fetcher = Arc::new(TefasFetcher::new(
        &tefas.base_url,
        tefas.max_days_per_request,
        config.retry.clone(),
    )?);
    let rate_source = Arc::new(YahooRateSource::new(&yahoo.base_url, config.retry.clone())?);

    let converter = RateConverter::new(
        rate_source,
        rate_cache,
        config.rates.lookback_days,
        utc_today,
    );
    Ok(FundDataService::new(record_store, fetcher, converter))
}

/// Validates and serves a fetch, returning the rendered series.
pub async fn fetch_rendered(config: &AppConfig, args: &FetchArgs) -> Result<String> {
    let request = fetch::validate(args, config, utc_today())?;
    let service = build_service(config)?;
    fetch::run(&service, &request, args.format).await
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Fetch(args) => {
            let rendered = fetch_rendered(&config, &args).await?;
            println!("{rendered}");
        }
    }
    Ok(())
}
