//! One streamed generation turn.
//!
//! A [`ModelTurn`] reduces the backend's chunks to what the orchestrator
//! needs: text deltas as they arrive, then a single summary with the turn's
//! full text and its finalised tool calls.

use crate::backends::{ArgumentsDelta, BackendChunk, ChunkStream, ToolCallDelta};
use crate::llm::LlmClient;
use parley_core::{History, ParleyError, ParleyResult, ToolCall, ToolDeclaration};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// What a turn yields while it is consumed.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A non-empty text fragment, as soon as it arrived.
    TextDelta(String),
    /// The turn ended with text, tool calls or both.
    Completed(TurnSummary),
    /// The turn ended with neither text nor tool calls.
    Empty,
}

/// Everything a finished turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnSummary {
    /// All text of the turn, fragments joined.
    pub text: String,
    /// Complete calls in the order the backend issued them.
    pub tool_calls: Vec<ToolCall>,
}

/// A single backend turn being consumed.
pub struct ModelTurn {
    chunks: ChunkStream,
    text: String,
    calls: CallAccumulator,
    max_text_bytes: usize,
    finished: bool,
}

impl ModelTurn {
    /// Starts a turn over the full history.
    pub async fn start(
        client: &LlmClient,
        history: &History,
        tools: &[ToolDeclaration],
        max_text_bytes: usize,
    ) -> ParleyResult<Self> {
        let chunks = client.stream_turn(history.turns(), tools).await?;
        Ok(Self::from_stream(chunks, max_text_bytes))
    }

    /// Wraps an already started backend stream.
    pub fn from_stream(chunks: ChunkStream, max_text_bytes: usize) -> Self {
        Self {
            chunks,
            text: String::new(),
            calls: CallAccumulator::default(),
            max_text_bytes,
            finished: false,
        }
    }

    /// Next event of the turn.
    ///
    /// Yields text deltas, then exactly one `Completed` or `Empty`, then
    /// `None`. An error also ends the turn.
    pub async fn next_event(&mut self) -> Option<ParleyResult<TurnEvent>> {
        if self.finished {
            return None;
        }

        loop {
            match self.chunks.next().await {
                Some(Ok(chunk)) => match self.absorb(chunk) {
                    Ok(Some(delta)) => return Some(Ok(TurnEvent::TextDelta(delta))),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(self.fail(e))),
                },
                Some(Err(e)) => return Some(Err(self.fail(e))),
                None => {
                    self.finished = true;
                    return Some(self.summarize());
                }
            }
        }
    }

    fn absorb(&mut self, chunk: BackendChunk) -> ParleyResult<Option<String>> {
        for delta in chunk.tool_calls {
            self.calls.absorb(delta);
        }

        let Some(text) = chunk.text.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        if self.text.len() + text.len() > self.max_text_bytes {
            return Err(ParleyError::Backend(format!(
                "Turn text exceeded {} bytes",
                self.max_text_bytes
            )));
        }
        self.text.push_str(&text);
        Ok(Some(text))
    }

    fn fail(&mut self, error: ParleyError) -> ParleyError {
        self.finished = true;
        error
    }

    fn summarize(&mut self) -> ParleyResult<TurnEvent> {
        let tool_calls = std::mem::take(&mut self.calls).finish()?;
        let text = std::mem::take(&mut self.text);
        debug!(text_len = text.len(), tool_calls = tool_calls.len(), "Model turn finished");

        if text.is_empty() && tool_calls.is_empty() {
            Ok(TurnEvent::Empty)
        } else {
            Ok(TurnEvent::Completed(TurnSummary { text, tool_calls }))
        }
    }
}

#[derive(Default)]
enum PartialArguments {
    #[default]
    Empty,
    Json(String),
    Value(Value),
}

#[derive(Default)]
struct PartialCall {
    name: Option<String>,
    arguments: PartialArguments,
}

/// Collects tool-call fragments by index until the turn ends.
#[derive(Default)]
struct CallAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

impl CallAccumulator {
    fn absorb(&mut self, delta: ToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if entry.name.is_none() {
            entry.name = delta.name.filter(|n| !n.is_empty());
        }
        match delta.arguments {
            ArgumentsDelta::Value(value) => entry.arguments = PartialArguments::Value(value),
            ArgumentsDelta::Json(fragment) => match &mut entry.arguments {
                PartialArguments::Json(buffer) => buffer.push_str(&fragment),
                other => *other = PartialArguments::Json(fragment),
            },
        }
    }

    /// Finalised calls in index order. Incomplete calls fail the whole turn.
    fn finish(self) -> ParleyResult<Vec<ToolCall>> {
        self.calls
            .into_iter()
            .map(|(index, partial)| {
                let name = partial.name.ok_or_else(|| {
                    ParleyError::Backend(format!("Tool call {index} has no name"))
                })?;
                let arguments = match partial.arguments {
                    PartialArguments::Empty => Value::Object(Default::default()),
                    PartialArguments::Value(value) => value,
                    PartialArguments::Json(json) if json.trim().is_empty() => {
                        Value::Object(Default::default())
                    }
                    PartialArguments::Json(json) => serde_json::from_str(&json).map_err(|e| {
                        ParleyError::Backend(format!("Tool call '{name}' has invalid arguments: {e}"))
                    })?,
                };
                if !arguments.is_object() {
                    return Err(ParleyError::Backend(format!(
                        "Tool call '{name}' arguments are not a JSON object"
                    )));
                }
                Ok(ToolCall::new(name, arguments))
            })
            .collect()
    }
}
