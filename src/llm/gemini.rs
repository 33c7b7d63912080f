use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    analysis_prompt, answer_prompt, parse_analysis, KnowledgeModel, ANALYSIS_SYSTEM_PROMPT,
    ANSWER_SYSTEM_PROMPT,
};
use crate::config::ModelConfig;
use crate::error::{MindOrbitError, Result};
use crate::models::{Analysis, ItemType, KnowledgeItem};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default()
    }
}

fn text_content(text: impl Into<String>) -> Content {
    Content {
        parts: vec![Part { text: text.into() }],
    }
}

/// Structured-output schema for analysis replies.
fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "summary": { "type": "STRING" },
            "tags": { "type": "ARRAY", "items": { "type": "STRING" } },
            "category": { "type": "STRING" }
        },
        "required": ["title", "summary", "tags", "category"]
    })
}

/// Google Gemini `generateContent` client
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    api_key_env: String,
    endpoint: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MindOrbitError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            client,
            api_key,
            api_key_env: config.api_key_env.clone(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    async fn generate(&self, request: GenerateContentRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MindOrbitError::MissingCredential(self.api_key_env.clone()))?;

        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MindOrbitError::Model(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(MindOrbitError::Model(format!("Gemini API error {}: {}", status, body)));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| MindOrbitError::Model(format!("Failed to parse response: {}", e)))?;

        log::debug!("Gemini generateContent took {:?}", start.elapsed());

        Ok(result.text())
    }
}

#[async_trait]
impl KnowledgeModel for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze_content(&self, content: &str, item_type: ItemType) -> Result<Analysis> {
        let request = GenerateContentRequest {
            contents: vec![text_content(analysis_prompt(content, item_type))],
            system_instruction: Some(text_content(ANALYSIS_SYSTEM_PROMPT)),
            generation_config: Some(json!({
                "responseMimeType": "application/json",
                "responseSchema": analysis_schema(),
            })),
        };
        let text = self.generate(request).await?;
        if text.trim().is_empty() {
            return Err(MindOrbitError::Model("No response from model".to_string()));
        }
        parse_analysis(&text)
    }

    async fn answer_question(&self, question: &str, context: &[&KnowledgeItem]) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![text_content(answer_prompt(question, context))],
            system_instruction: Some(text_content(ANSWER_SYSTEM_PROMPT)),
            generation_config: None,
        };
        self.generate(request).await
    }
}
