use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dividends::DividendAttributor;
use crate::error::Result;
use crate::fx::CurrencyConverter;
use crate::ledger::PositionLedger;
use crate::pricing::{CurrencyResolver, PriceHistoryProvider};
use crate::utils::checked_product;

/// Per-symbol figures in USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub currency: String,
    pub quantity_held: Decimal,
    /// Held shares at the latest close
    pub current_value_usd: Decimal,
    /// Every share ever acquired at the latest close, as if nothing was sold
    pub if_held_value_usd: Decimal,
    pub total_sales_usd: Decimal,
    pub dividends_received_usd: Decimal,
    pub dividends_if_held_usd: Decimal,
}

/// Sum of all symbol summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioTotals {
    pub current_value_usd: Decimal,
    pub if_held_value_usd: Decimal,
    pub total_sales_usd: Decimal,
    pub dividends_received_usd: Decimal,
    pub dividends_if_held_usd: Decimal,
}

impl PortfolioTotals {
    pub fn from_summaries(summaries: &[SymbolSummary]) -> Self {
        summaries.iter().fold(Self::default(), |mut acc, s| {
            acc.current_value_usd += s.current_value_usd;
            acc.if_held_value_usd += s.if_held_value_usd;
            acc.total_sales_usd += s.total_sales_usd;
            acc.dividends_received_usd += s.dividends_received_usd;
            acc.dividends_if_held_usd += s.dividends_if_held_usd;
            acc
        })
    }
}

/// Build the summary of one symbol after replay.
///
/// Symbols without price history report zero values.
pub fn summarize_symbol<P: PriceHistoryProvider>(
    symbol: &str,
    total_sales_usd: Decimal,
    ledger: &PositionLedger,
    dividends: &DividendAttributor,
    market: &mut CurrencyResolver<P>,
    fx: &mut CurrencyConverter,
) -> Result<SymbolSummary> {
    let currency = market.currency_of(symbol);
    let quantity_held = ledger.quantity(symbol);

    let (current_value_usd, if_held_value_usd) = match market.latest_close(symbol) {
        Some((date, close)) => {
            let current = fx
                .to_usd(checked_product(quantity_held, close, "holding value")?, &currency, date)
                .with_context(|| format!("valuing {} holdings", symbol))?;
            let acquired = ledger.total_acquired(symbol);
            let if_held = fx
                .to_usd(checked_product(acquired, close, "if-held value")?, &currency, date)
                .with_context(|| format!("valuing {} if held", symbol))?;
            (current, if_held)
        }
        None => (Decimal::ZERO, Decimal::ZERO),
    };

    let dividends_if_held_usd = dividends.dividends_if_held(symbol, ledger, market, fx)?;

    Ok(SymbolSummary {
        symbol: symbol.to_string(),
        currency,
        quantity_held,
        current_value_usd,
        if_held_value_usd,
        total_sales_usd,
        dividends_received_usd: dividends.received(symbol),
        dividends_if_held_usd,
    })
}
