// Ledger module - open positions and their dated quantity history

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// An open position in a single symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub currency: String,
    /// Cost basis in the symbol's trading currency
    pub cost_basis: Decimal,
}

impl Position {
    pub fn average_cost(&self) -> Decimal {
        if self.quantity > Decimal::ZERO {
            self.cost_basis / self.quantity
        } else {
            Decimal::ZERO
        }
    }
}

/// Data-quality problems tolerated during replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerAnomaly {
    /// More shares sold than were held (incomplete history, transfers in)
    Oversold {
        symbol: String,
        date: NaiveDate,
        requested: Decimal,
        held: Decimal,
    },
}

#[derive(Debug, Clone, Copy)]
struct QuantityDelta {
    date: NaiveDate,
    quantity: Decimal,
}

/// Open positions keyed by symbol, plus the buy/sell deltas that produced them
#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: BTreeMap<String, Position>,
    history: BTreeMap<String, Vec<QuantityDelta>>,
    anomalies: Vec<LedgerAnomaly>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add shares (cash purchase or compensation grant).
    pub fn apply_buy(
        &mut self,
        symbol: &str,
        date: NaiveDate,
        quantity: Decimal,
        native_value: Decimal,
        currency: &str,
    ) {
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                quantity: Decimal::ZERO,
                currency: currency.to_string(),
                cost_basis: Decimal::ZERO,
            });
        position.quantity += quantity;
        position.cost_basis += native_value;

        self.history
            .entry(symbol.to_string())
            .or_default()
            .push(QuantityDelta { date, quantity });

        debug!("{}: bought {} on {}, now {}", symbol, quantity, date, position.quantity);
    }

    /// Remove shares. Returns the native cost basis released by the sale.
    ///
    /// Selling more than is held does not fail: the excess is recorded as an
    /// anomaly and the position is closed.
    pub fn apply_sell(&mut self, symbol: &str, date: NaiveDate, quantity: Decimal) -> Decimal {
        let held = self.quantity(symbol);

        if quantity > held {
            warn!(
                "{}: selling {} on {} but only {} held; closing position",
                symbol, quantity, date, held
            );
            self.anomalies.push(LedgerAnomaly::Oversold {
                symbol: symbol.to_string(),
                date,
                requested: quantity,
                held,
            });
        }

        let removed = quantity.min(held);
        let deltas = self.history.entry(symbol.to_string()).or_default();
        if removed > Decimal::ZERO {
            deltas.push(QuantityDelta {
                date,
                quantity: -removed,
            });
        }

        let Some(position) = self.positions.get_mut(symbol) else {
            return Decimal::ZERO;
        };

        let released = position.average_cost() * removed;
        position.quantity -= quantity;
        position.cost_basis -= released;

        if position.quantity <= Decimal::ZERO {
            debug!("{}: position closed on {}", symbol, date);
            self.positions.remove(symbol);
        }
        released
    }

    /// Shares currently held (zero when no position)
    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or_default()
    }

    /// Shares held on `date`: every delta dated strictly before it.
    pub fn holdings_at(&self, symbol: &str, date: NaiveDate) -> Decimal {
        self.deltas_before(symbol, date).map(|d| d.quantity).sum()
    }

    /// Shares ever acquired before `date`, ignoring sales.
    pub fn acquired_before(&self, symbol: &str, date: NaiveDate) -> Decimal {
        self.deltas_before(symbol, date)
            .map(|d| d.quantity)
            .filter(|q| *q > Decimal::ZERO)
            .sum()
    }

    /// Shares ever acquired
    pub fn total_acquired(&self, symbol: &str) -> Decimal {
        self.history
            .get(symbol)
            .into_iter()
            .flatten()
            .map(|d| d.quantity)
            .filter(|q| *q > Decimal::ZERO)
            .sum()
    }

    fn deltas_before<'a>(
        &'a self,
        symbol: &str,
        date: NaiveDate,
    ) -> impl Iterator<Item = &'a QuantityDelta> + 'a {
        self.history
            .get(symbol)
            .into_iter()
            .flatten()
            .filter(move |d| d.date < date)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Open positions sorted by symbol
    pub fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Every symbol that has appeared in a buy or sell, sorted
    pub fn symbols(&self) -> Vec<String> {
        self.history.keys().cloned().collect()
    }

    pub fn anomalies(&self) -> &[LedgerAnomaly] {
        &self.anomalies
    }
}
