// Transactions module - normalized buy/sell records and replay ordering

pub mod loader;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FlowError;
use crate::utils::checked_product;

pub use loader::{load_transactions_csv, parse_transactions};

/// Transaction type (buy or sell)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
        }
    }

    /// Same-day sells replay before buys so their proceeds can fund them
    fn replay_rank(&self) -> u8 {
        match self {
            TransactionType::Sell => 0,
            TransactionType::Buy => 1,
        }
    }
}

impl FromStr for TransactionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "B" => Ok(TransactionType::Buy),
            "SELL" | "S" => Ok(TransactionType::Sell),
            _ => Err(()),
        }
    }
}

/// Where the money for a buy came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SourceTag {
    /// Cash already in the account
    #[default]
    Funds,
    /// Restricted stock unit vesting
    #[serde(rename = "RSU")]
    Rsu,
    /// Employee stock purchase plan
    #[serde(rename = "ESPP")]
    Espp,
    /// Performance stock unit vesting
    #[serde(rename = "PSU")]
    Psu,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Funds => "Funds",
            SourceTag::Rsu => "RSU",
            SourceTag::Espp => "ESPP",
            SourceTag::Psu => "PSU",
        }
    }

    pub fn is_compensation(&self) -> bool {
        !matches!(self, SourceTag::Funds)
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FUNDS" | "" => Ok(SourceTag::Funds),
            "RSU" => Ok(SourceTag::Rsu),
            "ESPP" => Ok(SourceTag::Espp),
            "PSU" => Ok(SourceTag::Psu),
            _ => Err(()),
        }
    }
}

/// A normalized portfolio transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_type: TransactionType,
    pub symbol: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub price: Decimal,
    pub source: SourceTag,
}

impl Transaction {
    pub fn buy(symbol: &str, date: NaiveDate, quantity: Decimal, price: Decimal) -> Self {
        Self {
            transaction_type: TransactionType::Buy,
            symbol: symbol.to_string(),
            date,
            quantity,
            price,
            source: SourceTag::Funds,
        }
    }

    pub fn sell(symbol: &str, date: NaiveDate, quantity: Decimal, price: Decimal) -> Self {
        Self {
            transaction_type: TransactionType::Sell,
            ..Self::buy(symbol, date, quantity, price)
        }
    }

    pub fn with_source(mut self, source: SourceTag) -> Self {
        self.source = source;
        self
    }

    /// Value in the symbol's trading currency
    pub fn native_value(&self) -> Result<Decimal, FlowError> {
        checked_product(self.quantity, self.price, "transaction value")
    }

    /// Reject quantities and prices the replay cannot account for.
    ///
    /// Both are bounded by [`MAX_FIELD_MAGNITUDE`] so running totals stay
    /// within Decimal range.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.symbol.trim().is_empty() {
            return Err(FlowError::ValidationError("empty symbol".to_string()));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(FlowError::ValidationError(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.price < Decimal::ZERO {
            return Err(FlowError::ValidationError(format!(
                "price must not be negative, got {}",
                self.price
            )));
        }
        if self.quantity > MAX_FIELD_MAGNITUDE || self.price > MAX_FIELD_MAGNITUDE {
            return Err(FlowError::ValidationError(format!(
                "quantity {} or price {} exceeds {}",
                self.quantity, self.price, MAX_FIELD_MAGNITUDE
            )));
        }
        Ok(())
    }
}

/// Largest quantity or price a transaction may carry (10^12)
pub const MAX_FIELD_MAGNITUDE: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Sort into replay order: date ascending, sells before buys, then input order.
pub fn sort_for_replay(transactions: &mut [Transaction]) {
    // sort_by_key is stable, which preserves input order for equal keys
    transactions.sort_by_key(|tx| (tx.date, tx.transaction_type.replay_rank()));
}
