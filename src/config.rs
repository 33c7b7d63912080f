use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::context::MatchPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mindorbit: MindOrbitConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Storage and logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct MindOrbitConfig {
    /// JSON file path, or SQLite database path when `store = "sqlite"`.
    pub data_path: PathBuf,
    #[serde(default)]
    pub store: StoreKind,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which persistence backend holds the working set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Json,
    Sqlite,
}

/// Language model provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Overrides the provider's default base URL when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    /// Any OpenAI-compatible `/chat/completions` endpoint.
    Openai,
}

/// Chat context selection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_limit: default_context_limit(),
            match_policy: MatchPolicy::default(),
        }
    }
}

/// Force layout parameters
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_link_distance")]
    pub link_distance: f64,
    #[serde(default = "default_link_strength")]
    pub link_strength: f64,
    #[serde(default = "default_charge_strength")]
    pub charge_strength: f64,
    #[serde(default = "default_collide_radius")]
    pub collide_radius: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            link_distance: default_link_distance(),
            link_strength: default_link_strength(),
            charge_strength: default_charge_strength(),
            collide_radius: default_collide_radius(),
            width: default_width(),
            height: default_height(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_context_limit() -> usize {
    crate::context::DEFAULT_CONTEXT_LIMIT
}

fn default_link_distance() -> f64 {
    100.0
}

fn default_link_strength() -> f64 {
    0.1
}

fn default_charge_strength() -> f64 {
    -200.0
}

fn default_collide_radius() -> f64 {
    30.0
}

fn default_width() -> f64 {
    800.0
}

fn default_height() -> f64 {
    600.0
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_http_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in MINDORBIT_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("MINDORBIT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// A missing API key is not checked here: it is reported per model call.
    fn validate(&self) -> Result<()> {
        if self.mindorbit.data_path.as_os_str().is_empty() {
            anyhow::bail!("mindorbit.data_path must not be empty");
        }

        if self.model.api_key_env.trim().is_empty() {
            anyhow::bail!("model.api_key_env must name an environment variable");
        }

        if self.model.timeout_secs == 0 {
            anyhow::bail!("model.timeout_secs must be greater than 0");
        }

        if self.chat.context_limit == 0 {
            anyhow::bail!("chat.context_limit must be greater than 0");
        }

        let layout = &self.layout;
        if layout.width <= 0.0 || layout.height <= 0.0 {
            anyhow::bail!("layout.width and layout.height must be greater than 0");
        }

        if !(0.0..=1.0).contains(&layout.link_strength) {
            anyhow::bail!("layout.link_strength must be between 0.0 and 1.0");
        }

        if layout.collide_radius < 0.0 || layout.link_distance < 0.0 {
            anyhow::bail!("layout.collide_radius and layout.link_distance must not be negative");
        }

        if layout.tick_interval_ms == 0 {
            anyhow::bail!("layout.tick_interval_ms must be greater than 0");
        }

        Ok(())
    }

    /// Get the store path
    pub fn data_path(&self) -> &Path {
        &self.mindorbit.data_path
    }

    /// Read the model API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
