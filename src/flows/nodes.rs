use serde::Serialize;
use std::collections::HashMap;

use crate::funds::INITIAL_CASH;

/// Node colors, assigned by registration index
pub const PALETTE: [&str; 20] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf", "#aec7e8", "#ffbb78", "#98df8a", "#ff9896", "#c5b0d5", "#c49c94",
    "#f7b6d2", "#c7c7c7", "#dbdb8d", "#9edae5",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SankeyNode {
    pub label: String,
    pub color: &'static str,
}

/// Graph nodes in registration order; "Initial Cash" is always node 0.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            labels: Vec::new(),
            index: HashMap::new(),
        };
        registry.ensure(INITIAL_CASH);
        registry
    }

    /// Index of `label`, registering it on first use
    pub fn ensure(&mut self, label: &str) -> usize {
        if let Some(&idx) = self.index.get(label) {
            return idx;
        }
        let idx = self.labels.len();
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn color(index: usize) -> &'static str {
        PALETTE[index % PALETTE.len()]
    }

    pub fn sankey_nodes(&self) -> Vec<SankeyNode> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, label)| SankeyNode {
                label: label.clone(),
                color: Self::color(idx),
            })
            .collect()
    }
}
