//! File-backed price history.
//!
//! The market-data downloader persists one CSV per symbol
//! (`<dir>/<SYMBOL>.csv`, columns `Date,Close,Dividends,Stock Splits,Currency`)
//! and the EUR/USD series under its ticker (`<dir>/EURUSD=X.csv`).

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{PriceHistoryProvider, PriceRow};
use crate::fx::ExchangeRate;
use crate::utils::{parse_date_prefix, parse_decimal};

pub const DEFAULT_EXCHANGE_RATE_SYMBOL: &str = "EURUSD=X";

#[derive(Debug, Clone)]
pub struct CsvPriceHistory {
    dir: PathBuf,
    exchange_rate_symbol: String,
}

impl CsvPriceHistory {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            exchange_rate_symbol: DEFAULT_EXCHANGE_RATE_SYMBOL.to_string(),
        }
    }

    pub fn with_exchange_rate_symbol(mut self, symbol: &str) -> Self {
        self.exchange_rate_symbol = symbol.to_string();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn series_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }
}

#[derive(Debug)]
struct SeriesColumns {
    date: usize,
    close: Option<usize>,
    dividends: Option<usize>,
    currency: Option<usize>,
}

fn find_columns(headers: &StringRecord, path: &Path) -> Result<SeriesColumns> {
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let date = position("date").ok_or_else(|| anyhow!("{:?} has no Date column", path))?;
    Ok(SeriesColumns {
        date,
        close: position("close"),
        dividends: position("dividends"),
        currency: position("currency"),
    })
}

fn read_rows(path: &Path) -> Result<Vec<PriceRow>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read headers of {:?}", path))?
        .clone();
    let columns = find_columns(&headers, path)?;
    debug!("Column mapping for {:?}: {:?}", path, columns);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read record in {:?}", path))?;
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();

        let Some(date) = parse_date_prefix(field(Some(columns.date))) else {
            warn!("Skipping row {} of {:?}: invalid date", idx + 2, path);
            continue;
        };

        let currency = Some(field(columns.currency))
            .filter(|c| !c.is_empty() && *c != "N/A")
            .map(str::to_string);

        rows.push(PriceRow {
            date,
            close: parse_decimal(field(columns.close)),
            dividend: parse_decimal(field(columns.dividends)).unwrap_or_default(),
            currency,
        });
    }

    // The downloader appends incrementally, so order is not guaranteed
    rows.sort_by_key(|row| row.date);
    Ok(rows)
}

impl PriceHistoryProvider for CsvPriceHistory {
    fn price_history(&self, symbol: &str) -> Result<Option<Vec<PriceRow>>> {
        let path = self.series_path(symbol);
        if !path.exists() {
            debug!("No price history for {} at {:?}", symbol, path);
            return Ok(None);
        }
        read_rows(&path).map(Some)
    }

    fn exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        let path = self.series_path(&self.exchange_rate_symbol);
        let rows = read_rows(&path)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.close.map(|rate| ExchangeRate::new(row.date, rate)))
            .collect())
    }
}
