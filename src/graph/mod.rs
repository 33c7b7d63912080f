//! Relation graph: category-linked nodes and their force-directed layout.
//!
//! The graph is rebuilt from the current item set on every request and never
//! cached, so deleted items can't leave dangling edges. Layout runs either as
//! a bounded settle ([`ForceSimulation::settle`]) or as a cancellable
//! background task ([`LayoutHandle`]).

mod builder;
pub mod layout;
pub mod task;

pub use builder::{build_graph, category_color, graph_stats, node_label, node_radius};
pub use layout::{ForceSimulation, LayoutParams, NodePosition};
pub use task::{LayoutHandle, LayoutSnapshot, LayoutState};

use serde::{Deserialize, Serialize};

/// One graph node per knowledge item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    /// Title shortened for display next to the node.
    pub label: String,
    pub category: String,
    /// Hex fill colour for the node's category.
    pub color: String,
    /// Summary length in characters.
    pub summary_len: usize,
    pub radius: f64,
}

/// Undirected edge between two items sharing a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl RelationGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Node and distinct-category counts for the overview display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub categories: usize,
}
