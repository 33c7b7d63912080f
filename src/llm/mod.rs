//! Language model capabilities: content analysis and question answering.
//!
//! Providers implement [`KnowledgeModel`]. Callers go through
//! [`analyze_or_fallback`] and [`answer_or_apology`]: transient errors are
//! logged and replaced by fixed fallback values. A missing API key is
//! permanent and is surfaced instead.

pub mod gemini;
#[cfg(test)]
pub(crate) mod mock;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiCompatClient;

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::config::{ModelConfig, ProviderKind};
use crate::context::format_context;
use crate::error::{MindOrbitError, Result};
use crate::models::{truncate_chars, Analysis, ItemType, KnowledgeItem};

/// Content is cut to this many characters before analysis.
pub const MAX_ANALYSIS_CHARS: usize = 5000;

/// Answer used when the answering call fails.
pub const APOLOGY: &str = "Sorry, I encountered an error while processing your question.";

/// Answer used when the model replies with no text.
pub const NO_ANSWER: &str = "I couldn't generate an answer.";

/// Answer used when no API key is configured.
pub const MISSING_KEY_ANSWER: &str = "Please configure your API Key.";

pub const ANALYSIS_SYSTEM_PROMPT: &str = "You are a Knowledge Manager. Always reply with a single JSON object with keys: title, summary, tags (array), category.";

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a personal knowledge assistant named \"Orbit\". \
Use the provided context from the user's personal knowledge base to answer their question. \
If the answer is not in the context, use your general knowledge but mention that it wasn't explicitly found in their notes. \
Keep the answer concise and helpful.";

/// Analysis and question answering over knowledge items.
#[async_trait]
pub trait KnowledgeModel: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Derive title, summary, tags and category from raw content.
    async fn analyze_content(&self, content: &str, item_type: ItemType) -> Result<Analysis>;

    /// Answer a question using the given context items.
    async fn answer_question(&self, question: &str, context: &[&KnowledgeItem]) -> Result<String>;
}

/// Build the configured provider client.
pub fn build_model(config: &ModelConfig, api_key: Option<String>) -> Result<Arc<dyn KnowledgeModel>> {
    let model: Arc<dyn KnowledgeModel> = match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config, api_key)?),
        ProviderKind::Openai => Arc::new(OpenAiCompatClient::new(config, api_key)?),
    };
    log::info!("Using {} model {}", model.name(), config.model);
    Ok(model)
}

/// Analyze content, substituting [`Analysis::fallback`] when the call fails.
///
/// A missing API key is returned as [`MindOrbitError::MissingCredential`] so
/// the caller can stop before anything is stored.
pub async fn analyze_or_fallback(
    model: &dyn KnowledgeModel,
    content: &str,
    item_type: ItemType,
) -> Result<Analysis> {
    match model.analyze_content(content, item_type).await {
        Ok(analysis) => Ok(analysis.normalized()),
        Err(MindOrbitError::MissingCredential(var)) => {
            log::warn!("{} analysis skipped: {} is not set", model.name(), var);
            Err(MindOrbitError::MissingCredential(var))
        }
        Err(e) => {
            log::error!("{} analysis failed: {}", model.name(), e);
            Ok(Analysis::fallback())
        }
    }
}

/// Answer a question, substituting a fixed message on any failure.
pub async fn answer_or_apology(model: &dyn KnowledgeModel, question: &str, context: &[&KnowledgeItem]) -> String {
    match model.answer_question(question, context).await {
        Ok(answer) if answer.trim().is_empty() => NO_ANSWER.to_string(),
        Ok(answer) => answer,
        Err(MindOrbitError::MissingCredential(var)) => {
            log::warn!("{} answer skipped: {} is not set", model.name(), var);
            MISSING_KEY_ANSWER.to_string()
        }
        Err(e) => {
            log::error!("{} answer failed: {}", model.name(), e);
            APOLOGY.to_string()
        }
    }
}

/// User prompt asking for a structured analysis of (truncated) content.
pub fn analysis_prompt(content: &str, item_type: ItemType) -> String {
    format!(
        "Analyze the following content (which is a {}).\n\
         1. Generate a short, concise title (max 6 words).\n\
         2. Write a 2-sentence summary of the key insights.\n\
         3. Extract 3-5 relevant tags (lowercase, single words).\n\
         4. Assign a broad category (e.g., \"Technology\", \"Science\", \"Health\", \"Philosophy\", \"Art\", \"Productivity\").\n\
         Return JSON only.\n\n\
         Content:\n\"{}\"",
        item_type,
        truncate_chars(content, MAX_ANALYSIS_CHARS)
    )
}

/// User prompt carrying the context block and the question.
pub fn answer_prompt(question: &str, context: &[&KnowledgeItem]) -> String {
    let context_block = if context.is_empty() {
        "(The knowledge base has no notes for this question. Answer from general knowledge and say that it was not found in the notes.)".to_string()
    } else {
        format_context(context)
    };
    format!("Context:\n{}\n\nUser Question:\n{}", context_block, question)
}

/// Strip markdown code fences a model may wrap around JSON.
pub fn clean_json(text: &str) -> String {
    let fences = Regex::new(r"```(?:json)?").expect("Invalid regex pattern");
    fences.replace_all(text, "").trim().to_string()
}

/// Parse a model reply into an [`Analysis`].
pub fn parse_analysis(text: &str) -> Result<Analysis> {
    let cleaned = clean_json(text);
    if cleaned.is_empty() {
        return Err(MindOrbitError::Model("Empty analysis response".to_string()));
    }
    serde_json::from_str(&cleaned)
        .map_err(|e| MindOrbitError::Model(format!("Malformed analysis JSON: {}", e)))
}
