use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fundflow::fx::UnknownCurrencyPolicy;

pub mod formatters;

#[derive(Parser)]
#[command(name = "fundflow")]
#[command(version, about = "Trace where the money behind each stock purchase came from")]
#[command(
    long_about = "Replays buy/sell transactions through a FIFO pool of realized funds (sale proceeds, dividends, RSU/ESPP/PSU grants) and reports which source financed each purchase, in USD."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory with <SYMBOL>.csv price histories
    #[arg(short, long, global = true)]
    pub resources: Option<PathBuf>,

    /// Transactions CSV
    #[arg(short, long, global = true)]
    pub transactions: Option<PathBuf>,

    /// Currencies other than USD/EUR: treat-as-usd or reject
    #[arg(long, global = true, value_parser = parse_policy)]
    pub unknown_currency: Option<UnknownCurrencyPolicy>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// List every flow edge (source -> purchase)
    Flows {
        /// Only flows into this symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// Per-symbol values, sales and dividends in USD
    Summary,

    /// Shares currently held
    Positions,

    /// Write nodes and links as Sankey JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_policy(raw: &str) -> Result<UnknownCurrencyPolicy, String> {
    raw.parse()
        .map_err(|_| format!("invalid policy '{}' (expected treat-as-usd or reject)", raw))
}
