//! Replay driver: walks transactions in order through the ledger, the fund
//! pool and the flow recorder, crediting dividends as dates advance.

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::dividends::DividendAttributor;
use crate::error::{FlowError, Result};
use crate::flows::FlowRecorder;
use crate::funds::{FundOrigin, FundPool};
use crate::fx::{CurrencyConverter, ExchangeRateTable, UnknownCurrencyPolicy};
use crate::ledger::PositionLedger;
use crate::pricing::{CsvPriceHistory, CurrencyResolver, PriceHistoryProvider};
use crate::reports::{summarize_symbol, FlowReport, PortfolioTotals};
use crate::transactions::{sort_for_replay, Transaction, TransactionType};

pub struct FlowEngine<P> {
    market: CurrencyResolver<P>,
    fx: CurrencyConverter,
    ledger: PositionLedger,
    pool: FundPool,
    dividends: DividendAttributor,
    recorder: FlowRecorder,
    sales_usd: BTreeMap<String, Decimal>,
    last_date: Option<NaiveDate>,
    last_buy_date: Option<NaiveDate>,
}

impl<P: PriceHistoryProvider> FlowEngine<P> {
    /// Build an engine over `provider`.
    ///
    /// A missing or unreadable rate series leaves the table empty; any EUR
    /// conversion then fails with `NoRateData`.
    pub fn new(provider: P, policy: UnknownCurrencyPolicy) -> Self {
        let rates = match provider.exchange_rates() {
            Ok(rates) => ExchangeRateTable::new(rates),
            Err(e) => {
                warn!("No exchange rates available: {:#}", e);
                ExchangeRateTable::default()
            }
        };
        if let Some((first, last)) = rates.date_range() {
            debug!("{} exchange rates from {} to {}", rates.len(), first, last);
        }

        Self {
            market: CurrencyResolver::new(provider),
            fx: CurrencyConverter::new(rates, policy),
            ledger: PositionLedger::new(),
            pool: FundPool::new(),
            dividends: DividendAttributor::new(),
            recorder: FlowRecorder::new(),
            sales_usd: BTreeMap::new(),
            last_date: None,
            last_buy_date: None,
        }
    }

    /// Queue starting capital ahead of the replay
    pub fn deposit(&mut self, amount_usd: Decimal, date: NaiveDate) -> Option<u64> {
        self.pool.deposit(amount_usd, date)
    }

    /// Replay a batch of transactions.
    ///
    /// The batch is sorted into replay order first. Batches must not reach
    /// back before a date an earlier batch already replayed, and may not
    /// add a sell on a date whose buys were already replayed.
    pub fn process(&mut self, mut transactions: Vec<Transaction>) -> Result<()> {
        sort_for_replay(&mut transactions);
        self.check_continues_replay(&transactions)?;

        for tx in &transactions {
            self.apply(tx)
                .with_context(|| format!("{} {} on {}", tx.transaction_type.as_str(), tx.symbol, tx.date))?;
        }
        Ok(())
    }

    /// Same-day sells replay before buys, so a later batch cannot slot a
    /// sell in front of buys that already drew on the pool.
    fn check_continues_replay(&self, transactions: &[Transaction]) -> Result<()> {
        if let (Some(first), Some(last)) = (transactions.first(), self.last_date) {
            if first.date < last {
                return Err(FlowError::ValidationError(format!(
                    "transaction on {} precedes already replayed {}",
                    first.date, last
                ))
                .into());
            }
        }

        if let Some(bought) = self.last_buy_date {
            let late_sell = transactions
                .iter()
                .take_while(|tx| tx.date == bought)
                .find(|tx| tx.transaction_type == TransactionType::Sell);
            if let Some(tx) = late_sell {
                return Err(FlowError::ValidationError(format!(
                    "sell of {} on {} after that day's buys were replayed",
                    tx.symbol, tx.date
                ))
                .into());
            }
        }
        Ok(())
    }

    fn apply(&mut self, tx: &Transaction) -> Result<()> {
        tx.validate()?;

        if self.last_date != Some(tx.date) {
            // Dividends paid before this date fund this date's buys
            if let Some(previous) = tx.date.pred_opt() {
                self.dividends.credit_through(
                    Some(previous),
                    &self.ledger,
                    &mut self.market,
                    &mut self.fx,
                    &mut self.pool,
                )?;
            }
            self.last_date = Some(tx.date);
        }

        self.recorder.ensure_node(&tx.symbol);
        let currency = self.market.currency_of(&tx.symbol);
        let native = tx.native_value()?;
        let usd = self.fx.to_usd(native, &currency, tx.date)?;

        match tx.transaction_type {
            TransactionType::Sell => {
                self.ledger.apply_sell(&tx.symbol, tx.date, tx.quantity);
                self.pool.add(FundOrigin::Sell, Some(&tx.symbol), usd, tx.date);
                *self.sales_usd.entry(tx.symbol.clone()).or_default() += usd;
            }
            TransactionType::Buy => {
                self.ledger
                    .apply_buy(&tx.symbol, tx.date, tx.quantity, native, &currency);
                self.last_buy_date = Some(tx.date);
                if tx.source.is_compensation() {
                    self.recorder.record_compensation(&mut self.pool, tx, usd)?;
                } else {
                    self.recorder.record_buy(&mut self.pool, tx, usd)?;
                }
            }
        }
        Ok(())
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn pool(&self) -> &FundPool {
        &self.pool
    }

    pub fn recorder(&self) -> &FlowRecorder {
        &self.recorder
    }

    /// Credit the remaining dividends and assemble the report
    pub fn finish(mut self) -> Result<FlowReport> {
        self.dividends.credit_through(
            None,
            &self.ledger,
            &mut self.market,
            &mut self.fx,
            &mut self.pool,
        )?;

        let mut summaries = Vec::new();
        for symbol in self.ledger.symbols() {
            let sales = self.sales_usd.get(&symbol).copied().unwrap_or_default();
            summaries.push(summarize_symbol(
                &symbol,
                sales,
                &self.ledger,
                &self.dividends,
                &mut self.market,
                &mut self.fx,
            )?);
        }
        let totals = PortfolioTotals::from_summaries(&summaries);

        let flagged_currencies = self.fx.flagged_currencies();
        if !flagged_currencies.is_empty() {
            warn!("Treated as USD: {}", flagged_currencies.join(", "));
        }

        let (nodes, edges) = self.recorder.into_parts();
        info!(
            "Replay done: {} nodes, {} edges, {} USD unspent",
            nodes.len(),
            edges.len(),
            self.pool.available()
        );

        Ok(FlowReport {
            nodes: nodes.sankey_nodes(),
            edges,
            positions: self.ledger.positions(),
            unspent: self.pool.sources().cloned().collect(),
            dividends: self.dividends.credits().to_vec(),
            summaries,
            totals,
            anomalies: self.ledger.anomalies().to_vec(),
            flagged_currencies,
        })
    }
}

/// Replay `transactions` over `provider` in one go
pub fn run<P: PriceHistoryProvider>(
    provider: P,
    policy: UnknownCurrencyPolicy,
    transactions: Vec<Transaction>,
) -> Result<FlowReport> {
    let mut engine = FlowEngine::new(provider, policy);
    engine.process(transactions)?;
    engine.finish()
}

/// Replay with CSV price histories and transactions located by `config`
pub fn run_with_config(config: &FlowConfig) -> Result<FlowReport> {
    let provider = CsvPriceHistory::new(&config.resources_dir)
        .with_exchange_rate_symbol(&config.exchange_rate_symbol);
    let transactions = crate::transactions::load_transactions_csv(&config.transactions_file)?;
    info!(
        "Loaded {} transactions from {}",
        transactions.len(),
        config.transactions_file.display()
    );
    run(provider, config.unknown_currency, transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funds::INITIAL_CASH;
    use crate::fx::ExchangeRate;
    use crate::pricing::{InMemoryPriceHistory, PriceRow};
    use crate::transactions::SourceTag;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn provider() -> InMemoryPriceHistory {
        InMemoryPriceHistory::new()
            .with_series("AAPL", vec![PriceRow::new(d(2020, 12, 31), dec!(130), "USD")])
            .with_series("MSFT", vec![PriceRow::new(d(2020, 12, 31), dec!(220), "USD")])
            .with_series("WDAY", vec![PriceRow::new(d(2020, 12, 31), dec!(240), "USD")])
            .with_rates(vec![ExchangeRate::new(d(2020, 1, 2), dec!(1.12))])
    }

    #[test]
    fn test_sell_then_buy_with_shortfall_and_rsu_grant() {
        let txs = vec![
            Transaction::buy("AAPL", d(2020, 1, 1), dec!(10), dec!(100)),
            Transaction::sell("AAPL", d(2020, 2, 1), dec!(5), dec!(160)),
            Transaction::buy("MSFT", d(2020, 3, 1), dec!(8), dec!(200)),
            Transaction::buy("WDAY", d(2020, 4, 1), dec!(50), dec!(180)).with_source(SourceTag::Rsu),
        ];

        let report = run(provider(), UnknownCurrencyPolicy::default(), txs).unwrap();

        assert_eq!(report.position("AAPL").unwrap().quantity, dec!(5));

        let msft: Vec<(&str, Decimal)> = report
            .edges_into("MSFT")
            .map(|e| (e.from_symbol.as_str(), e.value_usd))
            .collect();
        assert_eq!(msft, vec![("AAPL", dec!(800)), (INITIAL_CASH, dec!(800))]);

        let wday: Vec<&str> = report.edges_into("WDAY").map(|e| e.from_symbol.as_str()).collect();
        assert_eq!(wday, vec!["RSU Compensation"]);
        assert_eq!(report.edges_into("WDAY").next().unwrap().value_usd, dec!(9000));

        assert!(report.edges.len() >= 3);
        // RSU value is the only unspent source
        assert_eq!(report.unspent_usd(), dec!(9000));
    }

    #[test]
    fn test_eur_purchase_converted_at_trade_date() {
        let provider = InMemoryPriceHistory::new()
            .with_series("SAP.DE", vec![PriceRow::new(d(2020, 1, 2), dec!(120), "EUR")])
            .with_rates(vec![
                ExchangeRate::new(d(2020, 1, 2), dec!(1.10)),
                ExchangeRate::new(d(2020, 6, 1), dec!(1.20)),
            ]);
        let txs = vec![Transaction::buy("SAP.DE", d(2020, 1, 3), dec!(10), dec!(120))];

        let report = run(provider, UnknownCurrencyPolicy::default(), txs).unwrap();
        assert_eq!(report.edges[0].value_usd, dec!(1320));
        assert_eq!(report.node_label(report.edges[0].source), Some(INITIAL_CASH));
    }

    #[test]
    fn test_dividend_funds_later_buy() {
        let provider = InMemoryPriceHistory::new()
            .with_series(
                "KO",
                vec![PriceRow::new(d(2020, 3, 12), dec!(50), "USD").with_dividend(dec!(0.5))],
            )
            .with_series("PEP", vec![PriceRow::new(d(2020, 4, 1), dec!(130), "USD")]);
        let txs = vec![
            Transaction::buy("KO", d(2020, 1, 2), dec!(100), dec!(50)),
            Transaction::buy("PEP", d(2020, 4, 1), dec!(1), dec!(130)),
        ];

        let report = run(provider, UnknownCurrencyPolicy::default(), txs).unwrap();
        let pep: Vec<(&str, Decimal)> = report
            .edges_into("PEP")
            .map(|e| (e.from_symbol.as_str(), e.value_usd))
            .collect();
        assert_eq!(pep, vec![("Dividends", dec!(50)), (INITIAL_CASH, dec!(80))]);
        assert_eq!(report.summary("KO").unwrap().dividends_received_usd, dec!(50));
    }

    #[test]
    fn test_same_day_dividend_not_spent_that_day() {
        let provider = InMemoryPriceHistory::new().with_series(
            "KO",
            vec![PriceRow::new(d(2020, 3, 12), dec!(50), "USD").with_dividend(dec!(1))],
        );
        let txs = vec![
            Transaction::buy("KO", d(2020, 1, 2), dec!(10), dec!(50)),
            Transaction::buy("KO", d(2020, 3, 12), dec!(1), dec!(50)),
        ];

        let report = run(provider, UnknownCurrencyPolicy::default(), txs).unwrap();
        let sources: Vec<&str> = report.edges.iter().map(|e| e.from_symbol.as_str()).collect();
        assert_eq!(sources, vec![INITIAL_CASH, INITIAL_CASH]);
        // Credited after replay with the shares held before the ex-date
        assert_eq!(report.dividends.len(), 1);
        assert_eq!(report.dividends[0].shares, dec!(10));
        assert_eq!(report.unspent_usd(), dec!(10));
    }

    #[test]
    fn test_eur_without_rates_fails() {
        let provider = InMemoryPriceHistory::new()
            .with_series("SAP.DE", vec![PriceRow::new(d(2020, 1, 2), dec!(120), "EUR")]);
        let txs = vec![Transaction::buy("SAP.DE", d(2020, 1, 3), dec!(1), dec!(120))];

        let err = run(provider, UnknownCurrencyPolicy::default(), txs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::NoRateData(_))
        ));
    }

    #[test]
    fn test_out_of_order_batch_rejected() {
        let mut engine = FlowEngine::new(provider(), UnknownCurrencyPolicy::default());
        engine
            .process(vec![Transaction::buy("AAPL", d(2020, 5, 1), dec!(1), dec!(100))])
            .unwrap();
        let err = engine
            .process(vec![Transaction::buy("AAPL", d(2020, 4, 1), dec!(1), dec!(100))])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::ValidationError(_))
        ));
    }

    #[test]
    fn test_sell_on_already_bought_date_rejected() {
        let mut engine = FlowEngine::new(provider(), UnknownCurrencyPolicy::default());
        engine
            .process(vec![
                Transaction::buy("AAPL", d(2020, 1, 1), dec!(10), dec!(100)),
                Transaction::buy("MSFT", d(2020, 2, 1), dec!(5), dec!(100)),
            ])
            .unwrap();

        let err = engine
            .process(vec![Transaction::sell("AAPL", d(2020, 2, 1), dec!(5), dec!(100))])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::ValidationError(_))
        ));
        assert_eq!(engine.ledger().quantity("AAPL"), dec!(10));

        // More buys that day, or a later sell, still continue the replay
        engine
            .process(vec![Transaction::buy("MSFT", d(2020, 2, 1), dec!(1), dec!(100))])
            .unwrap();
        engine
            .process(vec![Transaction::sell("AAPL", d(2020, 2, 2), dec!(5), dec!(100))])
            .unwrap();
        assert_eq!(engine.ledger().quantity("MSFT"), dec!(6));
        assert_eq!(engine.pool().available(), dec!(500));
    }

    #[test]
    fn test_same_day_sell_in_one_batch_funds_buy() {
        let txs = vec![
            Transaction::buy("AAPL", d(2020, 1, 1), dec!(10), dec!(100)),
            Transaction::buy("MSFT", d(2020, 2, 1), dec!(5), dec!(100)),
            Transaction::sell("AAPL", d(2020, 2, 1), dec!(5), dec!(100)),
        ];

        let report = run(provider(), UnknownCurrencyPolicy::default(), txs).unwrap();
        let msft: Vec<(&str, Decimal)> = report
            .edges_into("MSFT")
            .map(|e| (e.from_symbol.as_str(), e.value_usd))
            .collect();
        assert_eq!(msft, vec![("AAPL", dec!(500))]);
    }

    #[test]
    fn test_oversized_transaction_fails_instead_of_panicking() {
        let txs = vec![Transaction::buy("AAPL", d(2020, 1, 1), Decimal::MAX, dec!(2))];
        let err = run(provider(), UnknownCurrencyPolicy::default(), txs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::ValidationError(_))
        ));

        // Price zero keeps the product in range, the quantity bound still applies
        let mut engine = FlowEngine::new(provider(), UnknownCurrencyPolicy::default());
        let err = engine
            .process(vec![
                Transaction::buy("AAPL", d(2020, 1, 1), Decimal::MAX, dec!(0)),
                Transaction::buy("AAPL", d(2020, 1, 2), Decimal::MAX, dec!(0)),
            ])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::ValidationError(_))
        ));
        assert_eq!(engine.ledger().quantity("AAPL"), Decimal::ZERO);
    }

    #[test]
    fn test_deposit_finances_first_buy() {
        let mut engine = FlowEngine::new(provider(), UnknownCurrencyPolicy::default());
        engine.deposit(dec!(1500), d(2019, 12, 31));
        engine
            .process(vec![Transaction::buy("AAPL", d(2020, 1, 1), dec!(10), dec!(100))])
            .unwrap();

        let report = engine.finish().unwrap();
        assert_eq!(report.edges.len(), 1);
        assert_eq!(report.edges[0].from_symbol, INITIAL_CASH);
        assert_eq!(report.unspent_usd(), dec!(500));
        assert_eq!(report.unspent[0].origin, FundOrigin::Deposit);
    }

    #[test]
    fn test_unknown_currency_flagged() {
        let provider = InMemoryPriceHistory::new()
            .with_series("7203.T", vec![PriceRow::new(d(2020, 1, 2), dec!(7000), "JPY")]);
        let txs = vec![Transaction::buy("7203.T", d(2020, 1, 3), dec!(1), dec!(7000))];

        let report = run(provider, UnknownCurrencyPolicy::TreatAsUsd, txs.clone()).unwrap();
        assert_eq!(report.flagged_currencies, vec!["JPY".to_string()]);
        assert_eq!(report.edges[0].value_usd, dec!(7000));

        let provider = InMemoryPriceHistory::new()
            .with_series("7203.T", vec![PriceRow::new(d(2020, 1, 2), dec!(7000), "JPY")]);
        assert!(run(provider, UnknownCurrencyPolicy::Reject, txs).is_err());
    }
}
