//! The working set of knowledge items and its mutations.
//!
//! [`KnowledgeBase`] is the single owner of the item collection. Every
//! mutation is followed by an explicit save to the backing store.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{MindOrbitError, Result};
use crate::graph::{build_graph, graph_stats, GraphStats, RelationGraph};
use crate::llm::{analyze_or_fallback, KnowledgeModel};
use crate::models::{ItemType, KnowledgeItem, UNCATEGORIZED};
use crate::store::ItemStore;

/// Chance that [`KnowledgeBase::rediscover`] surfaces an item.
const REDISCOVER_PROBABILITY: f64 = 0.3;

/// Validate raw input, run analysis and build a new item.
///
/// Analysis failures fall back to the default analysis. Empty content, a
/// malformed bare link or a missing API key reject the capture.
pub async fn capture_item(
    model: &dyn KnowledgeModel,
    content: &str,
    item_type: ItemType,
) -> Result<KnowledgeItem> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(MindOrbitError::InvalidInput("Content cannot be empty".to_string()));
    }

    if item_type == ItemType::Url && looks_like_link(trimmed) {
        url::Url::parse(trimmed)
            .map_err(|e| MindOrbitError::InvalidInput(format!("Invalid URL {}: {}", trimmed, e)))?;
    }

    let analysis = analyze_or_fallback(model, trimmed, item_type).await?;
    let item = KnowledgeItem::new(item_type, trimmed.to_string(), analysis);
    log::info!("Captured \"{}\" ({}) as {}", item.title, item.category, item.id);
    Ok(item)
}

/// A single token starting with an http(s) scheme; pasted article text is not.
fn looks_like_link(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://"))
        && !content.contains(char::is_whitespace)
}

pub struct KnowledgeBase {
    items: Vec<KnowledgeItem>,
    store: Arc<dyn ItemStore>,
}

impl KnowledgeBase {
    /// Load the working set from the store.
    ///
    /// Stored items with an empty or repeated id are dropped (first one
    /// wins), and a blank category becomes `Uncategorized`.
    pub async fn load(store: Arc<dyn ItemStore>) -> Result<Self> {
        let items = sanitize(store.load().await?);
        log::info!("Knowledge base loaded with {} items", items.len());
        Ok(Self { items, store })
    }

    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Items ordered by creation time; ties keep insertion order.
    pub fn sorted_by_created(&self) -> Vec<&KnowledgeItem> {
        let mut sorted: Vec<&KnowledgeItem> = self.items.iter().collect();
        sorted.sort_by_key(|i| i.created_at);
        sorted
    }

    /// Capture new content and append it to the working set.
    pub async fn capture(
        &mut self,
        model: &dyn KnowledgeModel,
        content: &str,
        item_type: ItemType,
    ) -> Result<KnowledgeItem> {
        let item = capture_item(model, content, item_type).await?;
        self.add(item.clone()).await?;
        Ok(item)
    }

    /// Append an item and save. The item stays in memory even if the save fails.
    pub async fn add(&mut self, item: KnowledgeItem) -> Result<()> {
        if item.id.is_empty() {
            return Err(MindOrbitError::InvalidInput("Item id cannot be empty".to_string()));
        }
        if self.get(&item.id).is_some() {
            return Err(MindOrbitError::InvalidInput(format!("Duplicate item id: {}", item.id)));
        }
        self.items.push(item);
        self.persist().await
    }

    /// Remove an item by id and save.
    pub async fn delete(&mut self, id: &str) -> Result<KnowledgeItem> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| MindOrbitError::ItemNotFound(id.to_string()))?;
        let removed = self.items.remove(pos);
        log::info!("Deleted \"{}\" ({})", removed.title, removed.id);
        self.persist().await?;
        Ok(removed)
    }

    /// Relation graph of the current items, rebuilt on every call.
    pub fn graph(&self) -> RelationGraph {
        build_graph(&self.items)
    }

    pub fn stats(&self) -> GraphStats {
        graph_stats(&self.items)
    }

    /// Occasionally pick a random item to resurface as a reminder.
    pub fn rediscover<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&KnowledgeItem> {
        if self.items.is_empty() || rng.gen::<f64>() >= REDISCOVER_PROBABILITY {
            return None;
        }
        self.random_item(rng)
    }

    /// Pick a random item, if any.
    pub fn random_item<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&KnowledgeItem> {
        self.items.choose(rng)
    }

    async fn persist(&self) -> Result<()> {
        self.store.save(&self.items).await.map_err(|e| {
            log::error!("Failed to save {} items via {} store: {}", self.items.len(), self.store.name(), e);
            e
        })
    }
}

fn sanitize(items: Vec<KnowledgeItem>) -> Vec<KnowledgeItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|mut item| {
            if item.id.trim().is_empty() {
                log::warn!("Dropping stored item \"{}\" with an empty id", item.title);
                return None;
            }
            if !seen.insert(item.id.clone()) {
                log::warn!("Dropping stored item with duplicate id {}", item.id);
                return None;
            }
            if item.category.trim().is_empty() {
                item.category = UNCATEGORIZED.to_string();
            }
            Some(item)
        })
        .collect()
}
