//! Fundflow - trace which realized funds financed each stock purchase
//!
//! Transactions are replayed through a position ledger and a FIFO pool of
//! USD fund sources (sale proceeds, dividends, equity compensation). Every
//! purchase becomes one or more flow edges from the sources that paid for
//! it, ready for a Sankey diagram.

pub mod config;
pub mod dividends;
pub mod engine;
pub mod error;
pub mod flows;
pub mod funds;
pub mod fx;
pub mod ledger;
pub mod pricing;
pub mod reports;
pub mod transactions;
pub mod utils;
