pub mod gemini;

use async_trait::async_trait;
use futures_util::Stream;
use parley_core::{ConversationTurn, ParleyResult, ToolDeclaration};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Trait for generation backends.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in `LlmClient::init_backend()` in `llm.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Starts one streamed turn over the full history.
    ///
    /// Errors before the first chunk (bad status, unreachable host) are
    /// returned directly; errors mid-stream arrive as stream items.
    async fn stream_turn(
        &self,
        history: &[ConversationTurn],
        tools: &[ToolDeclaration],
    ) -> ParleyResult<ChunkStream>;
}

/// One increment of a backend turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendChunk {
    /// Answer text carried by this increment, if any.
    pub text: Option<String>,
    /// Tool-call fragments carried by this increment.
    pub tool_calls: Vec<ToolCallDelta>,
}

impl BackendChunk {
    /// A chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A chunk carrying one tool-call fragment.
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            text: None,
            tool_calls: vec![delta],
        }
    }
}

/// A fragment of a tool call, keyed by its position in the turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallDelta {
    /// Position of the call within the turn.
    pub index: usize,
    /// Tool name; usually only on the first fragment.
    pub name: Option<String>,
    /// This fragment's share of the arguments.
    pub arguments: ArgumentsDelta,
}

/// Arguments as a backend delivers them.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentsDelta {
    /// A piece of a JSON document, concatenated with the call's other pieces.
    Json(String),
    /// The complete arguments object.
    Value(serde_json::Value),
}

/// Chunks of one backend turn.
///
/// Owns the task reading the backend response; dropping the stream aborts it,
/// which closes the underlying connection.
pub struct ChunkStream {
    rx: mpsc::Receiver<ParleyResult<BackendChunk>>,
    task: Option<JoinHandle<()>>,
}

impl ChunkStream {
    /// Spawns `reader` and streams whatever it sends.
    pub fn spawn<F, Fut>(capacity: usize, reader: F) -> Self
    where
        F: FnOnce(mpsc::Sender<ParleyResult<BackendChunk>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(reader(tx));
        Self {
            rx,
            task: Some(task),
        }
    }

    /// A stream over a fixed list of items, with no reader task.
    pub fn from_items(items: Vec<ParleyResult<BackendChunk>>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity covers every item.
            let _ = tx.try_send(item);
        }
        Self { rx, task: None }
    }

    /// Next chunk, or `None` once the backend turn has ended.
    pub async fn next(&mut self) -> Option<ParleyResult<BackendChunk>> {
        self.rx.recv().await
    }
}

impl Stream for ChunkStream {
    type Item = ParleyResult<BackendChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
