use anyhow::Context;
use parley_agent::{AgentConfig, ModelConfig};
use parley_builtins::SearchConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "parley.toml";

/// Everything the binary needs, from `parley.toml` plus environment overrides.
#[derive(Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_num_results")]
    pub num_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_search_base_url(),
            timeout_secs: default_search_timeout_secs(),
            num_results: default_num_results(),
        }
    }
}

impl SearchSettings {
    pub fn to_search_config(&self) -> SearchConfig {
        SearchConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            num_results: self.num_results,
        }
    }
}

#[derive(Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://serpapi.com".to_string()
}
fn default_search_timeout_secs() -> u64 {
    15
}
fn default_num_results() -> usize {
    5
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl ParleyConfig {
    /// Reads the config file. A missing file is only an error when the path
    /// was given explicitly.
    pub fn load(path: &Path, explicit: bool) -> anyhow::Result<Self> {
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml(&raw)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies environment overrides. `lookup` is `std::env::var` in the
    /// binary.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|v| !v.is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(key) = lookup("SERPAPI_KEY").filter(|v| !v.is_empty()) {
            self.search.api_key = Some(key);
        }
        if let Some(host) = lookup("PARLEY_HOST").filter(|v| !v.is_empty()) {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{port}'"))?;
        }
        Ok(())
    }
}
