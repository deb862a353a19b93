// Reports module - replay results and per-symbol summaries

pub mod portfolio;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::dividends::DividendCredit;
use crate::flows::{FlowEdge, SankeyData, SankeyNode};
use crate::funds::FundSource;
use crate::ledger::{LedgerAnomaly, Position};

pub use portfolio::{summarize_symbol, PortfolioTotals, SymbolSummary};

/// Everything a replay produced
#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub nodes: Vec<SankeyNode>,
    pub edges: Vec<FlowEdge>,
    pub positions: Vec<Position>,
    /// Fund sources still waiting to be spent, oldest first
    pub unspent: Vec<FundSource>,
    pub dividends: Vec<DividendCredit>,
    pub summaries: Vec<SymbolSummary>,
    pub totals: PortfolioTotals,
    pub anomalies: Vec<LedgerAnomaly>,
    /// Currency codes converted as USD because no rate source exists for them
    pub flagged_currencies: Vec<String>,
}

impl FlowReport {
    pub fn sankey(&self) -> SankeyData {
        SankeyData {
            nodes: self.nodes.clone(),
            links: self.edges.clone(),
        }
    }

    /// Edges financing purchases of `symbol`
    pub fn edges_into<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |edge| edge.symbol == symbol)
    }

    pub fn summary(&self, symbol: &str) -> Option<&SymbolSummary> {
        self.summaries.iter().find(|s| s.symbol == symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn node_label(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|node| node.label.as_str())
    }

    pub fn unspent_usd(&self) -> Decimal {
        self.unspent.iter().map(|s| s.amount_usd).sum()
    }

    pub fn total_flow_usd(&self) -> Decimal {
        self.edges.iter().map(|e| e.value_usd).sum()
    }
}
