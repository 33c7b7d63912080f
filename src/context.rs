//! Context selection for chat questions.
//!
//! Narrows the knowledge base down to a bounded set of items that is sent to
//! the answering model along with the question, and renders that set as the
//! prompt's context block.

use serde::Deserialize;

use crate::models::{truncate_chars, KnowledgeItem};

/// Maximum number of items forwarded as chat context.
pub const DEFAULT_CONTEXT_LIMIT: usize = 15;

/// Question tokens of this many characters or fewer are ignored.
const MIN_KEYWORD_CHARS: usize = 3;

/// Characters of raw content included per context item.
const CONTENT_SNIPPET_CHARS: usize = 300;

const CONTEXT_SEPARATOR: &str = "\n---\n";

/// How question keywords gate which items become candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Every item is a candidate; keywords are computed but never exclude
    /// anything. The result is the first `limit` items in collection order.
    #[default]
    Permissive,
    /// Only items whose title or tags contain a question keyword are candidates.
    Keyword,
}

/// Picks the items forwarded to the answering model for a question.
#[derive(Debug, Clone, Copy)]
pub struct ContextSelector {
    policy: MatchPolicy,
    limit: usize,
}

impl Default for ContextSelector {
    fn default() -> Self {
        Self::new(MatchPolicy::default(), DEFAULT_CONTEXT_LIMIT)
    }
}

impl ContextSelector {
    pub fn new(policy: MatchPolicy, limit: usize) -> Self {
        Self { policy, limit }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Select at most `limit` candidate items, preserving input order.
    ///
    /// No re-ranking happens: truncation keeps the earliest candidates.
    pub fn select<'a>(&self, question: &str, items: &'a [KnowledgeItem]) -> Vec<&'a KnowledgeItem> {
        let keywords = extract_keywords(question);

        let selected: Vec<&KnowledgeItem> = items
            .iter()
            .filter(|item| match self.policy {
                MatchPolicy::Permissive => true,
                MatchPolicy::Keyword => matches_keywords(item, &keywords),
            })
            .take(self.limit)
            .collect();

        log::debug!(
            "Selected {} of {} items as context ({:?}, {} keywords)",
            selected.len(),
            items.len(),
            self.policy,
            keywords.len()
        );

        selected
    }
}

/// Lowercased question words longer than three characters.
pub fn extract_keywords(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > MIN_KEYWORD_CHARS)
        .map(String::from)
        .collect()
}

/// Lowercased title plus space-joined tags.
fn search_surrogate(item: &KnowledgeItem) -> String {
    format!("{} {}", item.title, item.tags.join(" ")).to_lowercase()
}

/// True if any keyword occurs as a substring of the item's title or tags.
pub fn matches_keywords(item: &KnowledgeItem, keywords: &[String]) -> bool {
    let surrogate = search_surrogate(item);
    keywords.iter().any(|k| surrogate.contains(k.as_str()))
}

/// Render selected items as the context block of the answering prompt.
pub fn format_context(items: &[&KnowledgeItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "[Title: {}]\n[Category: {}]\n[Summary: {}]\n[Content Snippet: {}...]",
                item.title,
                item.category,
                item.summary,
                truncate_chars(&item.content, CONTENT_SNIPPET_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
