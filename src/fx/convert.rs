use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use super::ExchangeRateTable;
use crate::error::{FlowError, Result};
use crate::utils::checked_product;

/// What to do with a currency code that is neither USD nor EUR
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownCurrencyPolicy {
    /// Pass the amount through unchanged and flag the code
    #[default]
    TreatAsUsd,
    /// Fail the conversion
    Reject,
}

impl std::str::FromStr for UnknownCurrencyPolicy {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "treat-as-usd" | "usd" => Ok(UnknownCurrencyPolicy::TreatAsUsd),
            "reject" => Ok(UnknownCurrencyPolicy::Reject),
            _ => Err(()),
        }
    }
}

/// Normalizes native amounts to USD
#[derive(Debug)]
pub struct CurrencyConverter {
    table: ExchangeRateTable,
    policy: UnknownCurrencyPolicy,
    flagged: BTreeSet<String>,
}

impl CurrencyConverter {
    pub fn new(table: ExchangeRateTable, policy: UnknownCurrencyPolicy) -> Self {
        Self {
            table,
            policy,
            flagged: BTreeSet::new(),
        }
    }

    pub fn rates(&self) -> &ExchangeRateTable {
        &self.table
    }

    /// Convert `amount` in `currency` to USD as of `date`.
    pub fn to_usd(&mut self, amount: Decimal, currency: &str, date: NaiveDate) -> Result<Decimal> {
        let code = currency.trim().to_ascii_uppercase();
        match code.as_str() {
            "USD" => Ok(amount),
            "EUR" => {
                let rate = self.table.rate_near(date)?;
                Ok(checked_product(amount, rate, "EUR conversion")?)
            }
            _ => match self.policy {
                UnknownCurrencyPolicy::Reject => Err(FlowError::UnsupportedCurrency(code).into()),
                UnknownCurrencyPolicy::TreatAsUsd => {
                    if self.flagged.insert(code.clone()) {
                        warn!(
                            "Currency {} has no conversion table; treating amounts as USD",
                            code
                        );
                    }
                    Ok(amount)
                }
            },
        }
    }

    /// Currency codes that were passed through as USD
    pub fn flagged_currencies(&self) -> Vec<String> {
        self.flagged.iter().cloned().collect()
    }
}
