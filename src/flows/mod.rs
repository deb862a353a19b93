//! Fund-flow graph: one edge per slice of financing behind each purchase.

pub mod nodes;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FlowError, Result};
use crate::funds::{compensation_label, FundOrigin, FundPool};
use crate::transactions::{SourceTag, Transaction};

pub use nodes::{NodeRegistry, SankeyNode, PALETTE};

/// A labeled money flow from a source node into a bought symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Node indices into the registry
    pub source: usize,
    pub target: usize,
    pub value_usd: Decimal,
    pub date: NaiveDate,
    /// "Funds" for cash-financed buys, otherwise the compensation kind
    pub flow_type: SourceTag,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Label of the source node
    pub from_symbol: String,
}

/// Nodes and links in the shape a Sankey renderer consumes
#[derive(Debug, Clone, Serialize)]
pub struct SankeyData {
    pub nodes: Vec<SankeyNode>,
    pub links: Vec<FlowEdge>,
}

#[derive(Debug)]
pub struct FlowRecorder {
    nodes: NodeRegistry,
    edges: Vec<FlowEdge>,
}

impl Default for FlowRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRecorder {
    pub fn new() -> Self {
        Self {
            nodes: NodeRegistry::new(),
            edges: Vec::new(),
        }
    }

    /// Register a symbol's node ahead of any flow touching it
    pub fn ensure_node(&mut self, label: &str) -> usize {
        self.nodes.ensure(label)
    }

    /// Finance a cash buy from the pool and record one edge per slice.
    /// Returns the number of edges added.
    pub fn record_buy(&mut self, pool: &mut FundPool, tx: &Transaction, usd_value: Decimal) -> Result<usize> {
        let allocations = pool.allocate(usd_value, tx.date)?;
        let target = self.nodes.ensure(&tx.symbol);

        for allocation in &allocations {
            let source = self.nodes.ensure(&allocation.label);
            self.edges.push(FlowEdge {
                source,
                target,
                value_usd: allocation.amount_usd,
                date: tx.date,
                flow_type: SourceTag::Funds,
                symbol: tx.symbol.clone(),
                quantity: tx.quantity,
                price: tx.price,
                from_symbol: allocation.label.clone(),
            });
        }

        debug!(
            "{} on {}: {} USD from {} source(s)",
            tx.symbol,
            tx.date,
            usd_value,
            allocations.len()
        );
        Ok(allocations.len())
    }

    /// Record a compensation-financed buy as a single edge from its
    /// compensation node, and make the value available for later buys.
    /// Returns the number of edges added (none for a grant worth nothing).
    ///
    /// Prior cash in the pool is not touched. A `Funds` buy is rejected.
    pub fn record_compensation(
        &mut self,
        pool: &mut FundPool,
        tx: &Transaction,
        usd_value: Decimal,
    ) -> Result<usize> {
        let Some(origin) = FundOrigin::from_compensation(tx.source) else {
            return Err(FlowError::ValidationError(format!(
                "{} buy of {} on {} is not a compensation grant",
                tx.source, tx.symbol, tx.date
            ))
            .into());
        };

        let target = self.nodes.ensure(&tx.symbol);
        if usd_value <= Decimal::ZERO {
            debug!("{} on {}: {} grant worth nothing", tx.symbol, tx.date, tx.source);
            return Ok(0);
        }

        let label = compensation_label(tx.source);
        let source = self.nodes.ensure(&label);

        self.edges.push(FlowEdge {
            source,
            target,
            value_usd: usd_value,
            date: tx.date,
            flow_type: tx.source,
            symbol: tx.symbol.clone(),
            quantity: tx.quantity,
            price: tx.price,
            from_symbol: label,
        });

        pool.add(origin, Some(&tx.symbol), usd_value, tx.date);
        Ok(1)
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// Label of a node index
    pub fn label(&self, index: usize) -> Option<&str> {
        self.nodes.label(index)
    }

    pub fn sankey(&self) -> SankeyData {
        SankeyData {
            nodes: self.nodes.sankey_nodes(),
            links: self.edges.clone(),
        }
    }

    pub fn into_parts(self) -> (NodeRegistry, Vec<FlowEdge>) {
        (self.nodes, self.edges)
    }
}
