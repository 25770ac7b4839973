//! Rendering of fund series as JSON, CSV or a terminal table

use crate::cli::ui;
use crate::core::{FundSeries, PriceRecord};
use anyhow::{Context, Result};
use clap::ValueEnum;
use comfy_table::{Cell, CellAlignment};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Table,
}

#[derive(Serialize)]
struct ApiResponse<'a> {
    message: &'static str,
    data: &'a [PriceRecord],
}

pub fn render(series: &FundSeries, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(series),
        OutputFormat::Csv => to_csv(series),
        OutputFormat::Table => Ok(to_table(series)),
    }
}

pub fn to_json(series: &FundSeries) -> Result<String> {
    let response = ApiResponse {
        message: "ok",
        data: &series.records,
    };
    serde_json::to_string_pretty(&response).context("Failed to serialize series as JSON")
}

/// One row per record under a `symbol,date,price,currency` header.
pub fn to_csv(series: &FundSeries) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    // Written explicitly so an empty series still carries the header
    wtr.write_record(["symbol", "date", "price", "currency"])?;
    for record in &series.records {
        let date = record.date.to_string();
        let price = record.price.to_string();
        wtr.write_record([
            record.symbol.as_str(),
            date.as_str(),
            price.as_str(),
            record.currency.as_str(),
        ])?;
    }
    let bytes = wtr.into_inner().context("Failed to flush CSV output")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

pub fn to_table(series: &FundSeries) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Price ({})", series.currency)),
    ]);
    for record in &series.records {
        table.add_row(vec![
            Cell::new(record.date.to_string()),
            Cell::new(record.price.round_dp(6).normalize().to_string())
                .set_alignment(CellAlignment::Right),
        ]);
    }

    let title = format!("{} {}", series.symbol, series.range);
    format!(
        "{}\n{}\n{}",
        ui::style_text(&title, ui::StyleType::Title),
        table,
        ui::style_text(
            &format!("{} record(s)", series.records.len()),
            ui::StyleType::Subtle
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DateRange;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn series() -> FundSeries {
        let day = |d| NaiveDate::from_ymd_opt(2023, 1, d).unwrap();
        FundSeries {
            symbol: "ABC".to_string(),
            currency: "TRY".to_string(),
            range: DateRange::new(day(1), day(10)).unwrap(),
            records: vec![
                PriceRecord::new("ABC", day(2), Decimal::new(1250, 3), "TRY"),
                PriceRecord::new("ABC", day(3), Decimal::new(13, 1), "TRY"),
            ],
        }
    }

    #[test]
    fn test_json_envelope() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&series()).unwrap()).unwrap();
        assert_eq!(json["message"], "ok");
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"][0]["date"], "2023-01-02");
        assert_eq!(json["data"][0]["symbol"], "ABC");
        assert_eq!(json["data"][1]["currency"], "TRY");
    }

    #[test]
    fn test_csv_rows() {
        let csv = to_csv(&series()).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "symbol,date,price,currency",
                "ABC,2023-01-02,1.250,TRY",
                "ABC,2023-01-03,1.3,TRY",
            ]
        );
    }

    #[test]
    fn test_csv_of_empty_series_has_header() {
        let mut empty = series();
        empty.records.clear();
        assert_eq!(to_csv(&empty).unwrap(), "symbol,date,price,currency\n");
    }

    #[test]
    fn test_table_lists_every_record() {
        let table = to_table(&series());
        assert!(table.contains("2023-01-02"));
        assert!(table.contains("1.25"));
        assert!(table.contains("2 record(s)"));
    }
}
