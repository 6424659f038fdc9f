use async_trait::async_trait;
use parley_core::{ParleyError, ParleyResult, ToolDeclaration, ToolResult};
use parley_skills::Skill;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://serpapi.com";

const MISSING_KEY: &str = "Error: SERPAPI_KEY environment variable is required for web search. \
Please configure it in your .env file. Get your API key at https://serpapi.com/";

/// Settings for the SerpAPI-backed search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// SerpAPI key. Without it every search returns an error text.
    pub api_key: Option<String>,
    /// Scheme and host of the search API.
    pub base_url: String,
    /// Upper bound on a single search request.
    pub timeout: Duration,
    /// Maximum number of organic results included in the output.
    pub num_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(15),
            num_results: 5,
        }
    }
}

/// Arguments accepted by `web_search`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchArgs {
    /// The search query.
    pub query: String,
}

/// Searches the web through SerpAPI's Google engine and returns a text digest.
pub struct WebSearchSkill {
    descriptor: ToolDeclaration,
    config: SearchConfig,
    client: reqwest::Client,
}

impl WebSearchSkill {
    /// Builds the HTTP client; no request is sent yet.
    pub fn new(config: SearchConfig) -> ParleyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ParleyError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            descriptor: ToolDeclaration {
                name: "web_search".to_string(),
                description: "Search the web for current information, facts, or real-time data. \
                    Use this function when the user asks about current events, recent news, \
                    statistics, or anything requiring up-to-date information beyond your \
                    training data cutoff."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The specific search query to look up on the web. Be precise and focused."
                        }
                    },
                    "required": ["query"]
                }),
            },
            config,
            client,
        })
    }

    async fn search(&self, api_key: &str, query: &str) -> ToolResult {
        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let num = self.config.num_results.to_string();

        info!(query = %query, "Web search");

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("api_key", api_key),
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return transport_error(query, e),
        };

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            warn!(status = status.as_u16(), "Search API returned an error status");
            return ToolResult::error(
                "web_search",
                format!(
                    "Error performing web search (Status {}): {message}. Please check your SERPAPI_KEY.",
                    status.as_u16()
                ),
            );
        }

        match response.json::<Value>().await {
            Ok(data) => ToolResult::success(
                "web_search",
                format_results(query, &data, self.config.num_results),
            ),
            Err(e) => transport_error(query, e),
        }
    }
}

#[async_trait]
impl Skill for WebSearchSkill {
    fn descriptor(&self) -> &ToolDeclaration {
        &self.descriptor
    }

    async fn execute(&self, arguments: Value) -> ToolResult {
        let args: WebSearchArgs = match serde_json::from_value(arguments) {
            Ok(a) => a,
            Err(e) => {
                return ToolResult::error("web_search", format!("Error: invalid search arguments: {e}"))
            }
        };

        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            warn!("Web search requested without SERPAPI_KEY");
            return ToolResult::error("web_search", MISSING_KEY);
        };

        self.search(api_key, &args.query).await
    }
}

fn transport_error(query: &str, cause: reqwest::Error) -> ToolResult {
    warn!(error = %cause, "Web search request failed");
    ToolResult::error(
        "web_search",
        format!(
            "Error performing web search for: \"{query}\": {cause}. \
             Please try again or check your SERPAPI_KEY configuration."
        ),
    )
}

fn non_empty<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value[key].as_str().filter(|s| !s.is_empty())
}

/// Renders a SerpAPI response as plain text.
///
/// Organic results win over the answer box, which wins over the knowledge
/// graph.
fn format_results(query: &str, data: &Value, limit: usize) -> String {
    let mut out = format!("Search results for \"{query}\":\n\n");

    let organic = data["organic_results"].as_array().filter(|r| !r.is_empty());
    if let Some(items) = organic {
        for (i, item) in items.iter().take(limit).enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, non_empty(item, "title").unwrap_or("No title"));
            if let Some(snippet) = non_empty(item, "snippet") {
                let _ = writeln!(out, "   {snippet}");
            }
            if let Some(link) = non_empty(item, "link") {
                let _ = writeln!(out, "   URL: {link}");
            }
            out.push('\n');
        }
    } else if data["answer_box"].is_object() {
        let answer_box = &data["answer_box"];
        if let Some(answer) = non_empty(answer_box, "answer") {
            let _ = writeln!(out, "Answer: {answer}");
        }
        if let Some(snippet) = non_empty(answer_box, "snippet") {
            let _ = write!(out, "\n{snippet}\n");
        }
        if let Some(link) = non_empty(answer_box, "link") {
            let _ = write!(out, "\nSource: {link}\n");
        }
    } else if data["knowledge_graph"].is_object() {
        let kg = &data["knowledge_graph"];
        if let Some(title) = non_empty(kg, "title") {
            let _ = writeln!(out, "{title}");
        }
        if let Some(description) = non_empty(kg, "description") {
            let _ = writeln!(out, "{description}");
        }
    } else {
        return format!("No search results found for: \"{query}\"");
    }

    out.trim().to_string()
}
