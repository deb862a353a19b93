//! Error handling for fundflow
//!
//! Defines the typed failures of the attribution engine and establishes a
//! unified Result type using anyhow for context chaining and error propagation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Core error types for fund attribution
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("no exchange-rate data available for {0}")]
    NoRateData(NaiveDate),

    #[error("allocation amount must not be negative: {0}")]
    NegativeAllocation(Decimal),

    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for fundflow operations
pub type Result<T> = anyhow::Result<T>;
