//! Configuration system (layered: defaults < TOML file < environment).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentryError, Result};
use crate::models::LanguageModel;
use crate::types::GenerationSettings;

pub const DEFAULT_MODEL: &str = "google:gemini-2.5-flash";

/// Settings for the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum model round trips per invocation.
    pub max_turns: usize,
    /// Extra attempts for a transiently failing tool handler.
    pub max_tool_retries: u32,
    /// How many times an unknown tool name is fed back to the model before failing.
    pub max_unknown_tool_reprompts: u32,
    /// Wall-clock limit for one invocation, in seconds.
    pub timeout_secs: Option<u64>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_tool_retries: 2,
            max_unknown_tool_reprompts: 2,
            timeout_secs: None,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl AgentSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Sampling settings sent with every model request.
    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings::builder()
            .maybe_temperature(self.temperature)
            .maybe_max_tokens(self.max_tokens)
            .build()
    }
}

/// Settings for document ingestion and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Characters per chunk.
    pub chunk_size: usize,
    /// Passages returned by the RAG tool.
    pub top_k: usize,
    /// Chroma server; the in-memory backend is used when unset.
    pub chroma_url: Option<String>,
    pub collection: String,
    pub embedding_dimensions: usize,
    /// Owner used when a caller does not name one, for both upload and query.
    pub default_user_id: String,
    pub extract_timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            top_k: 3,
            chroma_url: None,
            collection: "user_pdfs".to_string(),
            embedding_dimensions: 384,
            default_user_id: "default".to_string(),
            extract_timeout_secs: 60,
        }
    }
}

/// Where conversation threads are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory for JSONL thread files; threads live in memory when unset.
    pub thread_dir: Option<PathBuf>,
}

/// Endpoints and credentials for the built-in tools.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub openweather_api_key: Option<String>,
    pub weather_base_url: String,
    pub joke_base_url: String,
    /// Sandboxed JavaScript executor; the code tool is registered only when set.
    pub executor_url: Option<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            openweather_api_key: None,
            weather_base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            joke_base_url: "https://v2.jokeapi.dev".to_string(),
            executor_url: None,
        }
    }
}

impl fmt::Debug for ToolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSettings")
            .field(
                "openweather_api_key",
                &self.openweather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("weather_base_url", &self.weather_base_url)
            .field("joke_base_url", &self.joke_base_url)
            .field("executor_url", &self.executor_url)
            .finish()
    }
}

/// Top-level configuration.
///
/// Resolution order:
/// 1. Built-in defaults
/// 2. TOML file (`--config` or `<config dir>/agentry/config.toml`)
/// 3. Environment variables (a `.env` file is loaded first when present)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentryConfig {
    /// `provider:model_id`.
    pub model: String,
    pub agent: AgentSettings,
    pub retrieval: RetrievalSettings,
    pub store: StoreSettings,
    pub tools: ToolSettings,
    api_keys: HashMap<String, String>,
    base_urls: HashMap<String, String>,
}

impl Default for AgentryConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            agent: AgentSettings::default(),
            retrieval: RetrievalSettings::default(),
            store: StoreSettings::default(),
            tools: ToolSettings::default(),
            api_keys: HashMap::new(),
            base_urls: HashMap::new(),
        }
    }
}

impl fmt::Debug for AgentryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&String> = self.api_keys.keys().collect();
        providers.sort();
        f.debug_struct("AgentryConfig")
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("retrieval", &self.retrieval)
            .field("store", &self.store)
            .field("tools", &self.tools)
            .field("api_keys", &providers)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

const API_KEY_VARS: [(&str, &str); 3] = [
    ("GOOGLE_API_KEY", "google"),
    ("GEMINI_API_KEY", "google"),
    ("ANTHROPIC_API_KEY", "anthropic"),
];

const BASE_URL_VARS: [(&str, &str); 2] = [
    ("GOOGLE_BASE_URL", "google"),
    ("ANTHROPIC_BASE_URL", "anthropic"),
];

impl AgentryConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load all layers. An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_toml_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading config file");
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AgentryError::Configuration(e.to_string()))
    }

    /// Overlay values from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        for (name, provider) in API_KEY_VARS {
            if let Some(key) = var(name) {
                self.set_api_key(provider, key);
            }
        }
        for (name, provider) in BASE_URL_VARS {
            if let Some(url) = var(name) {
                self.set_base_url(provider, url);
            }
        }

        if let Some(model) = var("AGENTRY_MODEL") {
            self.model = model;
        }
        if let Some(turns) = var("AGENTRY_MAX_TURNS") {
            self.agent.max_turns = turns.trim().parse().map_err(|_| {
                AgentryError::Configuration(format!("AGENTRY_MAX_TURNS must be a number, got '{turns}'"))
            })?;
        }
        if let Some(dir) = var("AGENTRY_THREAD_DIR") {
            self.store.thread_dir = Some(PathBuf::from(dir));
        }
        if let Some(user) = var("AGENTRY_DEFAULT_USER") {
            self.retrieval.default_user_id = user;
        }
        if let Some(url) = var("CHROMA_URL") {
            self.retrieval.chroma_url = Some(url);
        }
        if let Some(key) = var("OPENWEATHER_API_KEY") {
            self.tools.openweather_api_key = Some(key);
        }
        if let Some(url) = var("EXECUTOR_URL") {
            self.tools.executor_url = Some(url);
        }
        Ok(())
    }

    /// Parsed [`LanguageModel`] for `model`.
    pub fn language_model(&self) -> Result<LanguageModel> {
        self.model.parse()
    }

    pub fn set_api_key(&mut self, provider: &str, key: String) {
        self.api_keys.insert(provider.to_string(), key);
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.get(provider).cloned()
    }

    pub fn set_base_url(&mut self, provider: &str, url: String) {
        self.base_urls.insert(provider.to_string(), url);
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.get(provider).cloned()
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.api_keys.contains_key(provider)
    }
}

/// `<config dir>/agentry/config.toml` for the current platform.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agentry").map(|dirs| dirs.config_dir().join("config.toml"))
}
