use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WayfinderConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub amadeus: AmadeusConfig,
    pub server: ServerConfig,
    pub memory: MemoryConfig,
}

impl WayfinderConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: WayfinderConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if the file is missing or invalid, return
    /// defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GROQ_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GROQ_API_KEY_2") {
            self.llm.fallback_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GROQ_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("AMADEUS_CLIENT_ID") {
            self.amadeus.client_id = Some(v);
        }
        if let Ok(v) = std::env::var("AMADEUS_CLIENT_SECRET") {
            self.amadeus.client_secret = Some(v);
        }
        if let Ok(v) = std::env::var("WAYFINDER_DB_PATH") {
            self.memory.db_path = v;
        }
        if let Ok(v) = std::env::var("WAYFINDER_PORT") {
            if let Ok(n) = v.parse() {
                self.server.port = n;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    /// Primary API key. Usually supplied via GROQ_API_KEY.
    pub api_key: Option<String>,
    /// Fallback key tried exactly once on a transport failure (rate-limit
    /// rotation).
    pub fallback_api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen/qwen3-32b".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            fallback_api_key: None,
            max_tokens: 2048,
            // Lower for more deterministic planning.
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Correction cycles allowed per turn (not per tool call).
    pub max_retries: u32,
    /// Hard bound on reasoning iterations per turn.
    pub max_steps: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_steps: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmadeusConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Test environment by default (free, no billing).
    pub base_url: String,
}

impl Default for AmadeusConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            base_url: "https://test.api.amadeus.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: "wayfinder.db".to_string(),
        }
    }
}
