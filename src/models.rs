//! Core records: knowledge items, model analysis results and chat turns.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Category assigned when analysis fails or comes back empty.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Title assigned when analysis fails or comes back empty.
pub const UNTITLED: &str = "Untitled Knowledge";

/// Kind of content the user submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemType {
    Text,
    Url,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Text => "TEXT",
            ItemType::Url => "URL",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = crate::MindOrbitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Ok(ItemType::Text),
            "URL" => Ok(ItemType::Url),
            other => Err(crate::MindOrbitError::InvalidInput(format!(
                "Unknown item type: {}",
                other
            ))),
        }
    }
}

/// One captured unit of knowledge plus its derived metadata.
///
/// Serialized with the field names of the persisted working set
/// (`createdAt`, `type`), so stored collections round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub content: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl KnowledgeItem {
    /// Build a new item from raw content and its analysis.
    ///
    /// Assigns a fresh UUID and the current time. Empty analysis fields are
    /// replaced so that `title` and `category` are never blank.
    pub fn new(item_type: ItemType, content: String, analysis: Analysis) -> Self {
        let analysis = analysis.normalized();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_type,
            content,
            title: analysis.title,
            summary: analysis.summary,
            tags: analysis.tags,
            category: analysis.category,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Title, summary, tags and category derived from content by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
}

impl Analysis {
    /// Record substituted when analysis fails.
    pub fn fallback() -> Self {
        Self {
            title: UNTITLED.to_string(),
            summary: "Could not analyze content automatically.".to_string(),
            tags: vec!["misc".to_string()],
            category: UNCATEGORIZED.to_string(),
        }
    }

    /// Lowercase and trim tags, drop empty ones, and fill blank title/category.
    pub fn normalized(self) -> Self {
        let title = self.title.trim().to_string();
        let category = self.category.trim().to_string();
        let tags = self
            .tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            title: if title.is_empty() { UNTITLED.to_string() } else { title },
            summary: self.summary.trim().to_string(),
            tags,
            category: if category.is_empty() {
                UNCATEGORIZED.to_string()
            } else {
                category
            },
        }
    }
}

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
