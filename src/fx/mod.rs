//! EUR/USD exchange-rate table with nearest-date lookup.

pub mod convert;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FlowError, Result};

pub use convert::{CurrencyConverter, UnknownCurrencyPolicy};

/// One daily EUR→USD closing rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub date: NaiveDate,
    pub rate: Decimal,
}

impl ExchangeRate {
    pub fn new(date: NaiveDate, rate: Decimal) -> Self {
        Self { date, rate }
    }
}

/// Immutable, date-sorted EUR→USD rate table.
///
/// Lookups that miss an exact date fall back to the chronologically closest
/// entry. When two entries are equally close the earlier one wins.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRateTable {
    // Sorted by date, unique dates
    rates: Vec<(NaiveDate, Decimal)>,
}

impl ExchangeRateTable {
    pub fn new(rates: Vec<ExchangeRate>) -> Self {
        let mut sorted: Vec<(NaiveDate, Decimal)> = Vec::with_capacity(rates.len());

        for entry in rates {
            if entry.rate <= Decimal::ZERO {
                warn!(
                    "Dropping non-positive EUR/USD rate {} on {}",
                    entry.rate, entry.date
                );
                continue;
            }
            sorted.push((entry.date, entry.rate));
        }

        // Stable sort keeps input order within a date, so the last row wins below
        sorted.sort_by_key(|(date, _)| *date);
        let mut deduped: Vec<(NaiveDate, Decimal)> = Vec::with_capacity(sorted.len());
        for (date, rate) in sorted {
            match deduped.last_mut() {
                Some(last) if last.0 == date => last.1 = rate,
                _ => deduped.push((date, rate)),
            }
        }

        debug!("Loaded {} EUR/USD rates", deduped.len());
        Self { rates: deduped }
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// First and last dates covered by the table
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.rates.first(), self.rates.last()) {
            (Some(first), Some(last)) => Some((first.0, last.0)),
            _ => None,
        }
    }

    /// Rate on `date`, or on the closest date available.
    pub fn rate_near(&self, date: NaiveDate) -> Result<Decimal> {
        if self.rates.is_empty() {
            return Err(FlowError::NoRateData(date).into());
        }

        let idx = match self.rates.binary_search_by_key(&date, |(d, _)| *d) {
            Ok(idx) => return Ok(self.rates[idx].1),
            Err(idx) => idx,
        };

        let before = idx.checked_sub(1).map(|i| self.rates[i]);
        let after = self.rates.get(idx).copied();

        let (chosen_date, rate) = match (before, after) {
            (Some(b), Some(a)) => {
                let to_before = (date - b.0).num_days();
                let to_after = (a.0 - date).num_days();
                if to_before <= to_after {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return Err(FlowError::NoRateData(date).into()),
        };

        debug!("No EUR/USD rate on {}, using {} from {}", date, rate, chosen_date);
        Ok(rate)
    }
}
