//! Pool of realized inflows available to finance purchases.
//!
//! Inflows (sale proceeds, compensation, dividends, deposits) are queued in
//! the order they become available and spent oldest-first. Any part of a
//! purchase the queue cannot cover is attributed to "Initial Cash", an
//! implicit source that is never depleted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::transactions::SourceTag;

pub const INITIAL_CASH: &str = "Initial Cash";
pub const DIVIDENDS: &str = "Dividends";

/// What produced a fund source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundOrigin {
    Sell,
    Deposit,
    Rsu,
    Espp,
    Psu,
    Dividend,
}

impl FundOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundOrigin::Sell => "sell",
            FundOrigin::Deposit => "deposit",
            FundOrigin::Rsu => "rsu",
            FundOrigin::Espp => "espp",
            FundOrigin::Psu => "psu",
            FundOrigin::Dividend => "dividend",
        }
    }

    /// Compensation origin for a buy tag, `None` for plain cash buys
    pub fn from_compensation(tag: SourceTag) -> Option<Self> {
        match tag {
            SourceTag::Funds => None,
            SourceTag::Rsu => Some(FundOrigin::Rsu),
            SourceTag::Espp => Some(FundOrigin::Espp),
            SourceTag::Psu => Some(FundOrigin::Psu),
        }
    }

    /// Graph node a source of this kind is drawn from.
    ///
    /// Sale proceeds are drawn from the sold symbol; everything else from a
    /// named non-stock node.
    pub fn node_label(&self, symbol: Option<&str>) -> String {
        match (self, symbol) {
            (FundOrigin::Sell, Some(symbol)) => symbol.to_string(),
            (FundOrigin::Sell, None) | (FundOrigin::Deposit, _) => INITIAL_CASH.to_string(),
            (FundOrigin::Rsu, _) => compensation_label(SourceTag::Rsu),
            (FundOrigin::Espp, _) => compensation_label(SourceTag::Espp),
            (FundOrigin::Psu, _) => compensation_label(SourceTag::Psu),
            (FundOrigin::Dividend, _) => DIVIDENDS.to_string(),
        }
    }
}

impl fmt::Display for FundOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "RSU Compensation", "ESPP Compensation", ...
pub fn compensation_label(tag: SourceTag) -> String {
    format!("{} Compensation", tag.as_str())
}

/// A unit of realized USD inflow waiting to be spent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundSource {
    pub seq: u64,
    pub origin: FundOrigin,
    pub symbol: Option<String>,
    pub amount_usd: Decimal,
    pub date: NaiveDate,
}

impl FundSource {
    pub fn label(&self) -> String {
        self.origin.node_label(self.symbol.as_deref())
    }
}

/// One slice of a purchase's financing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Node the money is drawn from
    pub label: String,
    pub amount_usd: Decimal,
    /// `None` for the implicit Initial Cash fallback
    pub seq: Option<u64>,
    pub origin: FundOrigin,
}

#[derive(Debug, Default)]
pub struct FundPool {
    // Ascending seq; seq is assigned on insert so push_back keeps the order
    queue: VecDeque<FundSource>,
    next_seq: u64,
}

impl FundPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inflow. Returns its sequence id, or `None` when the amount
    /// is not positive and nothing was queued.
    pub fn add(
        &mut self,
        origin: FundOrigin,
        symbol: Option<&str>,
        amount_usd: Decimal,
        date: NaiveDate,
    ) -> Option<u64> {
        if amount_usd <= Decimal::ZERO {
            debug!("Ignoring {} inflow of {} on {}", origin, amount_usd, date);
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(FundSource {
            seq,
            origin,
            symbol: symbol.map(str::to_string),
            amount_usd,
            date,
        });
        Some(seq)
    }

    /// Queue a cash deposit (initial capital)
    pub fn deposit(&mut self, amount_usd: Decimal, date: NaiveDate) -> Option<u64> {
        self.add(FundOrigin::Deposit, None, amount_usd, date)
    }

    /// Finance `required_usd` from the oldest sources first.
    ///
    /// The returned slices always sum to `required_usd`; whatever the queue
    /// cannot cover is drawn from Initial Cash.
    pub fn allocate(&mut self, required_usd: Decimal, date: NaiveDate) -> Result<Vec<Allocation>> {
        if required_usd < Decimal::ZERO {
            return Err(FlowError::NegativeAllocation(required_usd).into());
        }

        let mut allocations = Vec::new();
        let mut remaining = required_usd;

        while remaining > Decimal::ZERO {
            let Some(front) = self.queue.front_mut() else {
                break;
            };

            let taken = remaining.min(front.amount_usd);
            allocations.push(Allocation {
                label: front.label(),
                amount_usd: taken,
                seq: Some(front.seq),
                origin: front.origin,
            });
            remaining -= taken;
            front.amount_usd -= taken;

            if front.amount_usd <= Decimal::ZERO {
                self.queue.pop_front();
            }
        }

        if remaining > Decimal::ZERO {
            debug!(
                "Pool exhausted on {}; {} drawn from {}",
                date, remaining, INITIAL_CASH
            );
            allocations.push(Allocation {
                label: INITIAL_CASH.to_string(),
                amount_usd: remaining,
                seq: None,
                origin: FundOrigin::Deposit,
            });
        }

        Ok(allocations)
    }

    /// Total unspent USD in the queue
    pub fn available(&self) -> Decimal {
        self.queue.iter().map(|s| s.amount_usd).sum()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Unspent sources, oldest first
    pub fn sources(&self) -> impl Iterator<Item = &FundSource> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn pool_with(amounts: &[Decimal]) -> FundPool {
        let mut pool = FundPool::new();
        for (i, amount) in amounts.iter().enumerate() {
            pool.add(
                FundOrigin::Sell,
                Some(format!("S{}", i).as_str()),
                *amount,
                d(2020, 1, 1 + i as u32),
            );
        }
        pool
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let mut pool = pool_with(&[dec!(100), dec!(50), dec!(200)]);

        let allocations = pool.allocate(dec!(120), d(2020, 2, 1)).unwrap();

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].seq, Some(0));
        assert_eq!(allocations[0].amount_usd, dec!(100));
        assert_eq!(allocations[1].seq, Some(1));
        assert_eq!(allocations[1].amount_usd, dec!(20));

        let left: Vec<(u64, Decimal)> = pool.sources().map(|s| (s.seq, s.amount_usd)).collect();
        assert_eq!(left, vec![(1, dec!(30)), (2, dec!(200))]);
    }

    #[test]
    fn test_shortfall_comes_from_initial_cash() {
        let mut pool = pool_with(&[dec!(800)]);

        let allocations = pool.allocate(dec!(1600), d(2020, 3, 1)).unwrap();

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].label, "S0");
        assert_eq!(allocations[1].label, INITIAL_CASH);
        assert_eq!(allocations[1].amount_usd, dec!(800));
        assert_eq!(allocations[1].seq, None);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_allocation_conserves_value() {
        let mut pool = pool_with(&[dec!(10.10), dec!(0.05), dec!(33.333)]);

        for required in [dec!(7.5), dec!(0), dec!(20), dec!(100.01)] {
            let total: Decimal = pool
                .allocate(required, d(2020, 4, 1))
                .unwrap()
                .iter()
                .map(|a| a.amount_usd)
                .sum();
            assert_eq!(total, required);
        }
        assert_eq!(pool.available(), Decimal::ZERO);
    }

    #[test]
    fn test_zero_requirement_is_empty() {
        let mut pool = pool_with(&[dec!(100)]);
        assert!(pool.allocate(dec!(0), d(2020, 1, 5)).unwrap().is_empty());
        assert_eq!(pool.available(), dec!(100));
    }

    #[test]
    fn test_negative_requirement_is_rejected() {
        let mut pool = pool_with(&[dec!(100)]);
        let err = pool.allocate(dec!(-1), d(2020, 1, 5)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowError>(),
            Some(FlowError::NegativeAllocation(_))
        ));
        assert_eq!(pool.available(), dec!(100));
    }

    #[test]
    fn test_labels_by_origin() {
        let mut pool = FundPool::new();
        let date = d(2020, 1, 1);
        pool.deposit(dec!(1), date);
        pool.add(FundOrigin::Rsu, Some("WDAY"), dec!(1), date);
        pool.add(FundOrigin::Espp, Some("WDAY"), dec!(1), date);
        pool.add(FundOrigin::Psu, Some("WDAY"), dec!(1), date);
        pool.add(FundOrigin::Dividend, Some("KO"), dec!(1), date);
        pool.add(FundOrigin::Sell, Some("AAPL"), dec!(1), date);

        let labels: Vec<String> = pool
            .allocate(dec!(6), date)
            .unwrap()
            .into_iter()
            .map(|a| a.label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "Initial Cash",
                "RSU Compensation",
                "ESPP Compensation",
                "PSU Compensation",
                "Dividends",
                "AAPL"
            ]
        );
    }

    #[test]
    fn test_non_positive_inflows_are_not_queued() {
        let mut pool = FundPool::new();
        assert_eq!(pool.add(FundOrigin::Sell, Some("X"), dec!(0), d(2020, 1, 1)), None);
        assert_eq!(pool.deposit(dec!(5), d(2020, 1, 1)), Some(0));
        assert_eq!(pool.len(), 1);
    }
}
