//! Graph construction from the knowledge item set.

use std::collections::{HashMap, HashSet};

use super::{GraphEdge, GraphNode, GraphStats, RelationGraph};
use crate::models::{KnowledgeItem, UNCATEGORIZED};

const MIN_RADIUS: f64 = 10.0;
const MAX_RADIUS: f64 = 20.0;

const LABEL_MAX_CHARS: usize = 15;
const LABEL_KEEP_CHARS: usize = 12;

const CATEGORY_COLORS: &[(&str, &str)] = &[
    ("Technology", "#3b82f6"),
    ("Science", "#10b981"),
    ("Health", "#f43f5e"),
    ("Philosophy", "#8b5cf6"),
    ("Art", "#f59e0b"),
    ("Productivity", "#06b6d4"),
    (UNCATEGORIZED, "#94a3b8"),
];

/// Build the relation graph: one node per item, one edge per pair of
/// distinct items with the same category.
///
/// Items are bucketed by category first so only same-category pairs are
/// visited. Edges come out in pairwise-scan order (earlier item as source).
pub fn build_graph(items: &[KnowledgeItem]) -> RelationGraph {
    let nodes = items.iter().map(graph_node).collect();

    let mut buckets: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        buckets.entry(item.category.as_str()).or_default().push(idx);
    }

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for members in buckets.values() {
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                if items[i].id != items[j].id {
                    pairs.push((i, j));
                }
            }
        }
    }
    pairs.sort_unstable();

    let edges = pairs
        .into_iter()
        .map(|(i, j)| GraphEdge {
            source: items[i].id.clone(),
            target: items[j].id.clone(),
        })
        .collect::<Vec<_>>();

    log::debug!("Built relation graph: {} nodes, {} edges", items.len(), edges.len());

    RelationGraph { nodes, edges }
}

fn graph_node(item: &KnowledgeItem) -> GraphNode {
    let summary_len = item.summary.chars().count();
    GraphNode {
        id: item.id.clone(),
        title: item.title.clone(),
        label: node_label(&item.title),
        category: item.category.clone(),
        color: category_color(&item.category).to_string(),
        summary_len,
        radius: node_radius(summary_len),
    }
}

/// Visual radius: a tenth of the summary length, clamped to [10, 20].
pub fn node_radius(summary_len: usize) -> f64 {
    (summary_len as f64 / 10.0).clamp(MIN_RADIUS, MAX_RADIUS)
}

/// Fill colour for a category; unknown categories share the uncategorized grey.
pub fn category_color(category: &str) -> &'static str {
    CATEGORY_COLORS
        .iter()
        .find(|(name, _)| *name == category)
        .or_else(|| CATEGORY_COLORS.iter().find(|(name, _)| *name == UNCATEGORIZED))
        .map(|(_, color)| *color)
        .unwrap_or("#94a3b8")
}

/// Titles longer than 15 characters are cut to 12 plus an ellipsis.
pub fn node_label(title: &str) -> String {
    if title.chars().count() > LABEL_MAX_CHARS {
        let kept: String = title.chars().take(LABEL_KEEP_CHARS).collect();
        format!("{}...", kept)
    } else {
        title.to_string()
    }
}

pub fn graph_stats(items: &[KnowledgeItem]) -> GraphStats {
    let categories: HashSet<&str> = items.iter().map(|i| i.category.as_str()).collect();
    GraphStats {
        nodes: items.len(),
        categories: categories.len(),
    }
}
