use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{SourceTag, Transaction, TransactionType};
use crate::error::FlowError;
use crate::utils::{parse_date_prefix, parse_decimal};

/// Load the normalized transaction list
/// (`transaction,symbol,date,quantity,price,source`).
pub fn load_transactions_csv<P: AsRef<Path>>(file_path: P) -> Result<Vec<Transaction>> {
    let path = file_path.as_ref();
    info!("Loading transactions from {:?}", path);

    let file = std::fs::File::open(path)
        .map_err(FlowError::from)
        .with_context(|| format!("Failed to open transactions file {:?}", path))?;
    parse_transactions(file)
}

/// Parse transactions from any CSV source.
///
/// Rows with missing or invalid fields are skipped with a warning; a missing
/// required column fails the whole load.
pub fn parse_transactions<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    let columns = find_columns(&headers)?;
    debug!("Transaction column mapping: {:?}", columns);

    let mut transactions = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.context("Failed to read CSV record")?;
        // Header is line 1
        let line = idx + 2;

        match parse_row(&record, &columns) {
            Ok(tx) => transactions.push(tx),
            Err(e) => {
                warn!("Skipping transaction row {}: {}", line, e);
            }
        }
    }

    info!("Parsed {} transactions", transactions.len());
    Ok(transactions)
}

#[derive(Debug)]
struct TransactionColumns {
    transaction_type: usize,
    symbol: usize,
    date: usize,
    quantity: usize,
    price: usize,
    source: Option<usize>,
}

fn find_columns(headers: &StringRecord) -> Result<TransactionColumns> {
    let position = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let required = |names: &[&str]| {
        position(names).ok_or_else(|| {
            anyhow!(FlowError::ParseError(format!(
                "missing required column '{}'",
                names[0]
            )))
        })
    };

    Ok(TransactionColumns {
        transaction_type: required(&["transaction", "type"])?,
        symbol: required(&["symbol", "ticker"])?,
        date: required(&["date"])?,
        quantity: required(&["quantity"])?,
        price: required(&["price", "pricePerShare"])?,
        source: position(&["source"]),
    })
}

fn parse_row(record: &StringRecord, columns: &TransactionColumns) -> Result<Transaction, FlowError> {
    let field = |idx: usize| record.get(idx).unwrap_or("").trim();

    let transaction_type = field(columns.transaction_type)
        .parse::<TransactionType>()
        .map_err(|_| {
            FlowError::ParseError(format!(
                "unknown transaction type '{}'",
                field(columns.transaction_type)
            ))
        })?;

    let symbol = field(columns.symbol).to_string();

    let date = parse_date_prefix(field(columns.date)).ok_or_else(|| {
        FlowError::ParseError(format!("invalid date '{}'", field(columns.date)))
    })?;

    let quantity = parse_decimal(field(columns.quantity)).ok_or_else(|| {
        FlowError::ParseError(format!("invalid quantity '{}'", field(columns.quantity)))
    })?;

    let price = parse_decimal(field(columns.price)).ok_or_else(|| {
        FlowError::ParseError(format!("invalid price '{}'", field(columns.price)))
    })?;

    // Sells always draw on funds; only buys carry a compensation tag
    let source = match (transaction_type, columns.source) {
        (TransactionType::Buy, Some(idx)) => field(idx).parse::<SourceTag>().map_err(|_| {
            FlowError::ParseError(format!("unknown source tag '{}'", field(idx)))
        })?,
        _ => SourceTag::Funds,
    };

    let tx = Transaction {
        transaction_type,
        symbol,
        date,
        quantity,
        price,
        source,
    };
    tx.validate()?;
    Ok(tx)
}
