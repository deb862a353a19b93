// Dividends module - realized and hypothetical dividend income per symbol

use anyhow::Context;
use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::Result;
use crate::funds::{FundOrigin, FundPool};
use crate::fx::CurrencyConverter;
use crate::ledger::PositionLedger;
use crate::pricing::{CurrencyResolver, DividendEvent, PriceHistoryProvider};
use crate::utils::checked_product;

/// A dividend paid into the fund pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendCredit {
    pub symbol: String,
    pub date: NaiveDate,
    pub shares: Decimal,
    pub per_share: Decimal,
    pub amount_usd: Decimal,
    /// Pool sequence id of the resulting fund source
    pub seq: Option<u64>,
}

/// Walks each symbol's dividend events against its holding history.
///
/// Every event is looked at exactly once: a per-symbol cursor marks how far
/// the series has been credited.
#[derive(Debug, Default)]
pub struct DividendAttributor {
    cursors: HashMap<String, usize>,
    received: BTreeMap<String, Decimal>,
    credits: Vec<DividendCredit>,
}

impl DividendAttributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `symbol`'s uncredited dividends dated up to `through` (all of
    /// them when `None`) and return the total received so far for it.
    pub fn dividends_received<P: PriceHistoryProvider>(
        &mut self,
        symbol: &str,
        through: Option<NaiveDate>,
        ledger: &PositionLedger,
        market: &mut CurrencyResolver<P>,
        fx: &mut CurrencyConverter,
        pool: &mut FundPool,
    ) -> Result<Decimal> {
        for event in self.pending(symbol, through, market) {
            self.credit_event(symbol, event, ledger, market, fx, pool)?;
        }
        Ok(self.received(symbol))
    }

    /// Credit pending dividends of every symbol the ledger has seen, in
    /// event-date order across symbols. Returns the USD amount credited.
    pub fn credit_through<P: PriceHistoryProvider>(
        &mut self,
        through: Option<NaiveDate>,
        ledger: &PositionLedger,
        market: &mut CurrencyResolver<P>,
        fx: &mut CurrencyConverter,
        pool: &mut FundPool,
    ) -> Result<Decimal> {
        let mut pending: Vec<(String, DividendEvent)> = Vec::new();
        for symbol in ledger.symbols() {
            for event in self.pending(&symbol, through, market) {
                pending.push((symbol.clone(), event));
            }
        }

        let mut credited = Decimal::ZERO;
        // Stable: same-date events keep symbol order
        for (symbol, event) in pending.into_iter().sorted_by_key(|(_, event)| event.date) {
            credited += self.credit_event(&symbol, event, ledger, market, fx, pool)?;
        }
        Ok(credited)
    }

    /// Dividends `symbol` would have paid on dates it was no longer held,
    /// had every share ever bought been kept. Never touches the pool.
    pub fn dividends_if_held<P: PriceHistoryProvider>(
        &self,
        symbol: &str,
        ledger: &PositionLedger,
        market: &mut CurrencyResolver<P>,
        fx: &mut CurrencyConverter,
    ) -> Result<Decimal> {
        let mut total = Decimal::ZERO;

        for event in market.dividend_events(symbol).iter() {
            if ledger.holdings_at(symbol, event.date) > Decimal::ZERO {
                continue;
            }
            let acquired = ledger.acquired_before(symbol, event.date);
            if acquired <= Decimal::ZERO {
                continue;
            }

            let currency = market.currency_of(symbol);
            let native = checked_product(acquired, event.per_share, "dividend")?;
            total += fx
                .to_usd(native, &currency, event.date)
                .with_context(|| format!("converting {} dividend of {}", symbol, event.date))?;
        }

        Ok(total)
    }

    /// Total USD credited for `symbol`
    pub fn received(&self, symbol: &str) -> Decimal {
        self.received.get(symbol).copied().unwrap_or_default()
    }

    pub fn total_received(&self) -> Decimal {
        self.received.values().copied().sum()
    }

    pub fn credits(&self) -> &[DividendCredit] {
        &self.credits
    }

    fn pending<P: PriceHistoryProvider>(
        &self,
        symbol: &str,
        through: Option<NaiveDate>,
        market: &mut CurrencyResolver<P>,
    ) -> Vec<DividendEvent> {
        let start = self.cursors.get(symbol).copied().unwrap_or(0);
        let events = market.dividend_events(symbol);
        events
            .get(start..)
            .unwrap_or_default()
            .iter()
            .take_while(|event| through.map_or(true, |limit| event.date <= limit))
            .copied()
            .collect()
    }

    fn credit_event<P: PriceHistoryProvider>(
        &mut self,
        symbol: &str,
        event: DividendEvent,
        ledger: &PositionLedger,
        market: &mut CurrencyResolver<P>,
        fx: &mut CurrencyConverter,
        pool: &mut FundPool,
    ) -> Result<Decimal> {
        let shares = ledger.holdings_at(symbol, event.date);

        let mut amount_usd = Decimal::ZERO;
        if shares > Decimal::ZERO {
            let currency = market.currency_of(symbol);
            let native = checked_product(shares, event.per_share, "dividend")?;
            amount_usd = fx
                .to_usd(native, &currency, event.date)
                .with_context(|| format!("converting {} dividend of {}", symbol, event.date))?;

            let seq = pool.add(FundOrigin::Dividend, Some(symbol), amount_usd, event.date);
            debug!(
                "{}: {} shares x {} on {} = {} USD",
                symbol, shares, event.per_share, event.date, amount_usd
            );

            *self.received.entry(symbol.to_string()).or_default() += amount_usd;
            self.credits.push(DividendCredit {
                symbol: symbol.to_string(),
                date: event.date,
                shares,
                per_share: event.per_share,
                amount_usd,
                seq,
            });
        }

        *self.cursors.entry(symbol.to_string()).or_default() += 1;
        Ok(amount_usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::{ExchangeRate, ExchangeRateTable, UnknownCurrencyPolicy};
    use crate::pricing::{InMemoryPriceHistory, PriceRow};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn provider() -> InMemoryPriceHistory {
        InMemoryPriceHistory::new()
            .with_series(
                "KO",
                vec![
                    PriceRow::new(d(2020, 3, 12), dec!(50), "USD").with_dividend(dec!(0.41)),
                    PriceRow::new(d(2020, 6, 12), dec!(47), "USD").with_dividend(dec!(0.41)),
                ],
            )
            .with_series(
                "SAP.DE",
                vec![PriceRow::new(d(2020, 5, 21), dec!(105), "EUR").with_dividend(dec!(1.58))],
            )
            .with_rates(vec![ExchangeRate::new(d(2020, 5, 20), dec!(1.10))])
    }

    fn fx(provider: &InMemoryPriceHistory) -> CurrencyConverter {
        let rates = provider.exchange_rates().unwrap();
        CurrencyConverter::new(ExchangeRateTable::new(rates), UnknownCurrencyPolicy::default())
    }

    #[test]
    fn test_held_through_ex_date_is_credited_once() {
        let provider = provider();
        let mut market = CurrencyResolver::new(&provider);
        let mut fx = fx(&provider);
        let mut pool = FundPool::new();
        let mut ledger = PositionLedger::new();
        ledger.apply_buy("KO", d(2020, 1, 2), dec!(100), dec!(5000), "USD");

        let mut attributor = DividendAttributor::new();
        let first = attributor
            .dividends_received("KO", None, &ledger, &mut market, &mut fx, &mut pool)
            .unwrap();
        let second = attributor
            .dividends_received("KO", None, &ledger, &mut market, &mut fx, &mut pool)
            .unwrap();

        assert_eq!(first, dec!(82));
        assert_eq!(second, dec!(82));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.available(), dec!(82));
        assert_eq!(attributor.credits().len(), 2);
    }

    #[test]
    fn test_sold_before_ex_date_goes_to_if_held() {
        let provider = provider();
        let mut market = CurrencyResolver::new(&provider);
        let mut fx = fx(&provider);
        let mut pool = FundPool::new();
        let mut ledger = PositionLedger::new();
        ledger.apply_buy("KO", d(2020, 1, 2), dec!(100), dec!(5000), "USD");
        ledger.apply_sell("KO", d(2020, 3, 1), dec!(100));

        let mut attributor = DividendAttributor::new();
        let received = attributor
            .dividends_received("KO", None, &ledger, &mut market, &mut fx, &mut pool)
            .unwrap();
        let if_held = attributor
            .dividends_if_held("KO", &ledger, &mut market, &mut fx)
            .unwrap();

        assert_eq!(received, Decimal::ZERO);
        assert!(pool.is_empty());
        assert_eq!(if_held, dec!(82));
    }

    #[test]
    fn test_partial_window_and_through_limit() {
        let provider = provider();
        let mut market = CurrencyResolver::new(&provider);
        let mut fx = fx(&provider);
        let mut pool = FundPool::new();
        let mut ledger = PositionLedger::new();
        ledger.apply_buy("KO", d(2020, 1, 2), dec!(10), dec!(500), "USD");
        ledger.apply_sell("KO", d(2020, 4, 1), dec!(10));

        let mut attributor = DividendAttributor::new();
        let through_march = attributor
            .credit_through(Some(d(2020, 3, 31)), &ledger, &mut market, &mut fx, &mut pool)
            .unwrap();
        assert_eq!(through_march, dec!(4.1));

        let rest = attributor
            .credit_through(None, &ledger, &mut market, &mut fx, &mut pool)
            .unwrap();
        assert_eq!(rest, Decimal::ZERO);

        // June dividend missed after the April exit
        let if_held = attributor
            .dividends_if_held("KO", &ledger, &mut market, &mut fx)
            .unwrap();
        assert_eq!(if_held, dec!(4.1));
        assert_eq!(attributor.received("KO"), dec!(4.1));
    }

    #[test]
    fn test_eur_dividend_converted_at_event_date() {
        let provider = provider();
        let mut market = CurrencyResolver::new(&provider);
        let mut fx = fx(&provider);
        let mut pool = FundPool::new();
        let mut ledger = PositionLedger::new();
        ledger.apply_buy("SAP.DE", d(2020, 1, 2), dec!(10), dec!(1200), "EUR");

        let mut attributor = DividendAttributor::new();
        let received = attributor
            .dividends_received("SAP.DE", None, &ledger, &mut market, &mut fx, &mut pool)
            .unwrap();

        assert_eq!(received, dec!(17.38));
        assert_eq!(pool.sources().next().unwrap().label(), "Dividends");
    }

    #[test]
    fn test_symbol_without_history_yields_zero() {
        let provider = provider();
        let mut market = CurrencyResolver::new(&provider);
        let mut fx = fx(&provider);
        let mut pool = FundPool::new();
        let mut ledger = PositionLedger::new();
        ledger.apply_buy("ZZZ", d(2020, 1, 2), dec!(10), dec!(100), "USD");

        let mut attributor = DividendAttributor::new();
        assert_eq!(
            attributor
                .dividends_received("ZZZ", None, &ledger, &mut market, &mut fx, &mut pool)
                .unwrap(),
            Decimal::ZERO
        );
        assert_eq!(
            attributor
                .dividends_if_held("ZZZ", &ledger, &mut market, &mut fx)
                .unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_absurd_dividend_fails_instead_of_panicking() {
        let provider = InMemoryPriceHistory::new().with_series(
            "BAD",
            vec![PriceRow::new(d(2020, 3, 12), dec!(50), "USD").with_dividend(Decimal::MAX)],
        );
        let mut market = CurrencyResolver::new(&provider);
        let mut fx = fx(&provider);
        let mut pool = FundPool::new();
        let mut ledger = PositionLedger::new();
        ledger.apply_buy("BAD", d(2020, 1, 2), dec!(10), dec!(500), "USD");

        let mut attributor = DividendAttributor::new();
        let err = attributor
            .credit_through(None, &ledger, &mut market, &mut fx, &mut pool)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::FlowError>(),
            Some(crate::error::FlowError::ValidationError(_))
        ));
        assert!(pool.is_empty());
    }
}
