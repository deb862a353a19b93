// Pricing module - per-symbol price/dividend/currency history behind a provider trait

pub mod csv_store;
pub mod resolver;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::fx::ExchangeRate;

pub use csv_store::CsvPriceHistory;
pub use resolver::CurrencyResolver;

/// One daily row of a symbol's persisted history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub close: Option<Decimal>,
    /// Cash dividend per share going ex on this date (zero when none)
    pub dividend: Decimal,
    pub currency: Option<String>,
}

impl PriceRow {
    pub fn new(date: NaiveDate, close: Decimal, currency: &str) -> Self {
        Self {
            date,
            close: Some(close),
            dividend: Decimal::ZERO,
            currency: Some(currency.to_string()),
        }
    }

    pub fn with_dividend(mut self, dividend: Decimal) -> Self {
        self.dividend = dividend;
        self
    }
}

/// A dated per-share dividend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DividendEvent {
    pub date: NaiveDate,
    pub per_share: Decimal,
}

/// Source of market data consumed by the attribution engine.
///
/// Implementations decide where the data lives; the engine only relies on
/// this interface and memoizes what it reads.
pub trait PriceHistoryProvider {
    /// Daily rows for `symbol` sorted by date, or `None` when no history exists
    fn price_history(&self, symbol: &str) -> Result<Option<Vec<PriceRow>>>;

    /// Daily EUR→USD closing rates
    fn exchange_rates(&self) -> Result<Vec<ExchangeRate>>;
}

impl<P: PriceHistoryProvider + ?Sized> PriceHistoryProvider for &P {
    fn price_history(&self, symbol: &str) -> Result<Option<Vec<PriceRow>>> {
        (**self).price_history(symbol)
    }

    fn exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        (**self).exchange_rates()
    }
}

impl<P: PriceHistoryProvider + ?Sized> PriceHistoryProvider for Box<P> {
    fn price_history(&self, symbol: &str) -> Result<Option<Vec<PriceRow>>> {
        (**self).price_history(symbol)
    }

    fn exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        (**self).exchange_rates()
    }
}

/// Provider holding everything in memory (tests, embedding callers)
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceHistory {
    series: HashMap<String, Vec<PriceRow>>,
    rates: Vec<ExchangeRate>,
}

impl InMemoryPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, mut rows: Vec<PriceRow>) -> Self {
        rows.sort_by_key(|row| row.date);
        self.series.insert(symbol.to_string(), rows);
        self
    }

    pub fn with_rates(mut self, rates: Vec<ExchangeRate>) -> Self {
        self.rates = rates;
        self
    }
}

impl PriceHistoryProvider for InMemoryPriceHistory {
    fn price_history(&self, symbol: &str) -> Result<Option<Vec<PriceRow>>> {
        Ok(self.series.get(symbol).cloned())
    }

    fn exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        Ok(self.rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_in_memory_provider_sorts_rows() {
        let d1 = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        let provider = InMemoryPriceHistory::new().with_series(
            "AAPL",
            vec![
                PriceRow::new(d2, dec!(75), "USD"),
                PriceRow::new(d1, dec!(74), "USD"),
            ],
        );

        let rows = provider.price_history("AAPL").unwrap().unwrap();
        assert_eq!(rows[0].date, d1);
        assert!(provider.price_history("MSFT").unwrap().is_none());
    }

    #[test]
    fn test_provider_usable_through_reference_and_box() {
        let provider = InMemoryPriceHistory::new();
        let by_ref: &dyn PriceHistoryProvider = &provider;
        assert!(by_ref.exchange_rates().unwrap().is_empty());

        let boxed: Box<dyn PriceHistoryProvider> = Box::new(provider);
        assert!(boxed.price_history("X").unwrap().is_none());
    }
}
