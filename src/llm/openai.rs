use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    analysis_prompt, answer_prompt, parse_analysis, KnowledgeModel, ANALYSIS_SYSTEM_PROMPT,
    ANSWER_SYSTEM_PROMPT,
};
use crate::config::ModelConfig;
use crate::error::{MindOrbitError, Result};
use crate::models::{Analysis, ItemType, KnowledgeItem};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Request structure for the chat completions API
#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

/// Response structure from the chat completions API
#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
///
/// Covers OpenAI itself and compatible hosts such as Volcengine Ark (Doubao),
/// selected via `model.endpoint`.
pub struct OpenAiCompatClient {
    client: Client,
    api_key: Option<String>,
    api_key_env: String,
    endpoint: String,
    model: String,
}

impl OpenAiCompatClient {
    /// Create a new client
    ///
    /// `api_key` may be `None`; every call then fails with
    /// [`MindOrbitError::MissingCredential`].
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

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    fn build_request(&self, system: &str, user: String, temperature: f32, max_tokens: u32) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatCompletionMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatCompletionMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        }
    }

    /// Send one chat request and return the first choice's text
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| MindOrbitError::MissingCredential(self.api_key_env.clone()))?;

        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
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

            return Err(MindOrbitError::Model(format!(
                "Chat completions API error {}: {}",
                status, body
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| MindOrbitError::Model(format!("Failed to parse response: {}", e)))?;

        log::debug!("Chat completion took {:?}", start.elapsed());

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl KnowledgeModel for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn analyze_content(&self, content: &str, item_type: ItemType) -> Result<Analysis> {
        let request = self.build_request(
            ANALYSIS_SYSTEM_PROMPT,
            analysis_prompt(content, item_type),
            0.2,
            600,
        );
        let text = self.complete(request).await?;
        parse_analysis(&text)
    }

    async fn answer_question(&self, question: &str, context: &[&KnowledgeItem]) -> Result<String> {
        let request = self.build_request(
            ANSWER_SYSTEM_PROMPT,
            answer_prompt(question, context),
            0.7,
            800,
        );
        self.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> ModelConfig {
        ModelConfig {
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            endpoint: endpoint.map(String::from),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_default_endpoint() {
        let client = OpenAiCompatClient::new(&config(None), None).unwrap();
        assert_eq!(client.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_custom_endpoint_trailing_slash() {
        let client = OpenAiCompatClient::new(
            &config(Some("https://ark.cn-beijing.volces.com/api/v3/")),
            None,
        )
        .unwrap();
        assert_eq!(
            client.completions_url(),
            "https://ark.cn-beijing.volces.com/api/v3/chat/completions"
        );
    }

    #[test]
    fn test_request_shape() {
        let client = OpenAiCompatClient::new(&config(None), Some("k".to_string())).unwrap();
        let request = client.build_request("sys", "user text".to_string(), 0.2, 600);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "user text");
        assert_eq!(json["max_tokens"], 600);
    }

    #[test]
    fn test_response_parsing_tolerates_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = OpenAiCompatClient::new(&config(None), None).unwrap();
        let err = client.answer_question("q", &[]).await.unwrap_err();
        assert!(matches!(err, MindOrbitError::MissingCredential(ref v) if v == "OPENAI_API_KEY"));

        let err = client.analyze_content("c", ItemType::Text).await.unwrap_err();
        assert!(matches!(err, MindOrbitError::MissingCredential(_)));
    }
}
