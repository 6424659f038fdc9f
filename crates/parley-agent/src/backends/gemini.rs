use super::{ArgumentsDelta, BackendChunk, ChunkStream, LlmBackend, ToolCallDelta};
use crate::config::ModelConfig;
use async_trait::async_trait;
use futures_util::StreamExt;
use parley_core::{ConversationTurn, ParleyError, ParleyResult, Part, Role, ToolDeclaration};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Google Gemini backend using `streamGenerateContent` with server-sent events.
pub struct GeminiBackend {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiBackend {
    /// Fails when no API key is configured.
    pub fn new(config: ModelConfig) -> ParleyResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ParleyError::Config("GEMINI_API_KEY environment variable is required".into())
            })?;

        // Bounds each read rather than the whole response: a turn may stream
        // for longer than the timeout as long as chunks keep arriving.
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url().trim_end_matches('/'),
            self.config.model_id
        )
    }

    fn build_body(&self, history: &[ConversationTurn], tools: &[ToolDeclaration]) -> Value {
        let mut body = json!({
            "contents": build_contents(history),
            "generationConfig": {"temperature": self.config.temperature},
        });
        if !tools.is_empty() {
            body["tools"] = json!([{"functionDeclarations": build_tools(tools)}]);
        }
        body
    }
}

fn build_contents(history: &[ConversationTurn]) -> Vec<Value> {
    history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "model",
                Role::Tool => "function",
            };
            let parts: Vec<Value> = turn
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text { text } => json!({"text": text}),
                    Part::FunctionCall { call } => json!({
                        "functionCall": {"name": call.name, "args": call.arguments}
                    }),
                    Part::FunctionResponse { name, content } => json!({
                        "functionResponse": {"name": name, "response": {"results": content}}
                    }),
                })
                .collect();
            json!({"role": role, "parts": parts})
        })
        .collect()
}

fn build_tools(tools: &[ToolDeclaration]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters_schema,
            })
        })
        .collect()
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn stream_turn(
        &self,
        history: &[ConversationTurn],
        tools: &[ToolDeclaration],
    ) -> ParleyResult<ChunkStream> {
        let body = self.build_body(history, tools);

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            let message = serde_json::from_str::<Value>(&error_body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(error_body);
            warn!(status = status.as_u16(), "Gemini API rejected the request");
            return Err(ParleyError::Backend(format!(
                "Gemini API error {status}: {message}"
            )));
        }

        let byte_stream = resp.bytes_stream();
        Ok(ChunkStream::spawn(256, move |tx| read_events(byte_stream, tx)))
    }
}

async fn read_events<S, B>(stream: S, tx: mpsc::Sender<ParleyResult<BackendChunk>>)
where
    S: futures_util::Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer: Vec<u8> = Vec::new();
    let mut next_index = 0usize;

    while let Some(chunk_result) = stream.next().await {
        let chunk = match chunk_result {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(ParleyError::Http(format!("Stream read error: {e}"))))
                    .await;
                return;
            }
        };
        buffer.extend_from_slice(chunk.as_ref());

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=line_end).collect();
            if !forward_line(&line, &mut next_index, &tx).await {
                return;
            }
        }
    }

    if !buffer.is_empty() {
        forward_line(&buffer, &mut next_index, &tx).await;
    }
}

/// Parses one SSE line and forwards its chunk. Returns `false` when reading
/// should stop.
async fn forward_line(
    raw: &[u8],
    next_index: &mut usize,
    tx: &mpsc::Sender<ParleyResult<BackendChunk>>,
) -> bool {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() || line.starts_with(':') {
        return true;
    }
    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
        return true;
    };

    match parse_payload(data, next_index) {
        Ok(Some(chunk)) => tx.send(Ok(chunk)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

/// Maps one `data:` payload to a chunk. Function calls take consecutive
/// indices across the whole turn.
fn parse_payload(data: &str, next_index: &mut usize) -> ParleyResult<Option<BackendChunk>> {
    if data == "[DONE]" {
        return Ok(None);
    }

    let event: Value = serde_json::from_str(data)
        .map_err(|e| ParleyError::Backend(format!("Malformed stream payload: {e}")))?;

    if let Some(err) = event.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(ParleyError::Backend(format!("Gemini API error: {message}")));
    }

    let mut chunk = BackendChunk::default();
    let parts = event["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    for part in parts {
        if let Some(text) = part["text"].as_str() {
            // Thought summaries are not part of the answer.
            if part["thought"].as_bool() == Some(true) || text.is_empty() {
                continue;
            }
            chunk.text.get_or_insert_with(String::new).push_str(text);
        } else if let Some(call) = part.get("functionCall") {
            chunk.tool_calls.push(ToolCallDelta {
                index: *next_index,
                name: call["name"].as_str().map(str::to_string),
                arguments: ArgumentsDelta::Value(
                    call.get("args").cloned().unwrap_or_else(|| json!({})),
                ),
            });
            *next_index += 1;
        }
    }

    if chunk.text.is_none() && chunk.tool_calls.is_empty() {
        if let Some(reason) = event["promptFeedback"]["blockReason"].as_str() {
            return Err(ParleyError::Backend(format!("Prompt blocked: {reason}")));
        }
        debug!("Stream payload carried no content");
        return Ok(None);
    }
    Ok(Some(chunk))
}
