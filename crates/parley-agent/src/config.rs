use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation backend providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini `streamGenerateContent`.
    #[default]
    Gemini,
}

/// Settings of the generation backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which backend serves the turns.
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name, e.g. `gemini-2.5-pro`.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Backend credential. Checked when the first query needs the backend.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Bounds connecting and each read of a streamed response.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model_id() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model_id: default_model_id(),
            api_key: None,
            api_base_url: None,
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// The configured endpoint, or the provider's public one.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
            }
        }
    }
}

// Keeps the credential out of logs.
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// How text produced by the first model turn reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirstTurnText {
    /// Held until the turn ends, then sent as one `reasoning` event when tool
    /// calls follow, or as one `response` when they don't.
    #[default]
    Buffered,
    /// Forwarded as `reasoning` deltas while they arrive; when no tool call
    /// follows, the whole text is repeated as the final `response`.
    Streamed,
}

/// Settings of the agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model turns per query, continuations included.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Upper bound on the text accumulated by a single turn.
    #[serde(default = "default_max_turn_text_bytes")]
    pub max_turn_text_bytes: usize,
    /// Delivery of first-turn text.
    #[serde(default)]
    pub first_turn_text: FirstTurnText,
    /// Sent as `reasoning` when a turn requests tools without saying anything.
    #[serde(default)]
    pub intent_notice: Option<String>,
    /// Upper bound on one tool execution.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_turns() -> u32 {
    8
}

fn default_max_turn_text_bytes() -> usize {
    1024 * 1024
}

fn default_tool_timeout_secs() -> u64 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_turn_text_bytes: default_max_turn_text_bytes(),
            first_turn_text: FirstTurnText::default(),
            intent_notice: None,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}
