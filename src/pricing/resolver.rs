//! Memoized per-symbol market data
//!
//! Every symbol's history is read from the provider at most once per
//! resolver, and its dividend events are extracted at most once. Read failures degrade: the symbol is treated as having no
//! history, its currency resolves to USD and its dividend/value figures are
//! zero.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{DividendEvent, PriceHistoryProvider, PriceRow};

pub const FALLBACK_CURRENCY: &str = "USD";

pub struct CurrencyResolver<P> {
    provider: P,
    series: HashMap<String, Arc<Vec<PriceRow>>>,
    dividends: HashMap<String, Arc<Vec<DividendEvent>>>,
    currencies: HashMap<String, String>,
}

impl<P: PriceHistoryProvider> CurrencyResolver<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            series: HashMap::new(),
            dividends: HashMap::new(),
            currencies: HashMap::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Trading currency of `symbol`; "USD" when it cannot be determined.
    pub fn currency_of(&mut self, symbol: &str) -> String {
        if let Some(currency) = self.currencies.get(symbol) {
            return currency.clone();
        }

        let history = self.history(symbol);
        let currency = history
            .iter()
            .find_map(|row| row.currency.as_deref())
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| {
                debug!("No currency recorded for {}, assuming {}", symbol, FALLBACK_CURRENCY);
                FALLBACK_CURRENCY.to_string()
            });

        self.currencies.insert(symbol.to_string(), currency.clone());
        currency
    }

    /// Full daily history of `symbol` (empty when unavailable).
    pub fn history(&mut self, symbol: &str) -> Arc<Vec<PriceRow>> {
        if let Some(rows) = self.series.get(symbol) {
            return Arc::clone(rows);
        }

        let rows = match self.provider.price_history(symbol) {
            Ok(Some(rows)) => rows,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Could not read price history for {}: {:#}", symbol, e);
                Vec::new()
            }
        };

        let rows = Arc::new(rows);
        self.series.insert(symbol.to_string(), Arc::clone(&rows));
        rows
    }

    /// Dividend events of `symbol` in date order
    pub fn dividend_events(&mut self, symbol: &str) -> Arc<Vec<DividendEvent>> {
        if let Some(events) = self.dividends.get(symbol) {
            return Arc::clone(events);
        }

        let events: Vec<DividendEvent> = self
            .history(symbol)
            .iter()
            .filter(|row| row.dividend > Decimal::ZERO)
            .map(|row| DividendEvent {
                date: row.date,
                per_share: row.dividend,
            })
            .collect();

        let events = Arc::new(events);
        self.dividends.insert(symbol.to_string(), Arc::clone(&events));
        events
    }

    /// Most recent closing price with its date
    pub fn latest_close(&mut self, symbol: &str) -> Option<(NaiveDate, Decimal)> {
        self.history(symbol)
            .iter()
            .rev()
            .find_map(|row| row.close.map(|close| (row.date, close)))
    }
}
