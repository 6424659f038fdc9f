use serde::{Deserialize, Serialize};

/// A discrete event streamed to the client while a query is processed.
///
/// Serialized with a `type` tag, e.g. `{"type":"response","content":"4"}`.
///
/// Tool calls follow a pending/resolved pair policy: every executed call is
/// announced once with `output: null` right before the tool runs, then once
/// more with the tool's text output. A missing `output` field decodes as
/// pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of the model's free text before a tool call is committed.
    Reasoning {
        /// The text fragment.
        content: String,
    },

    /// A tool invocation, either pending (`output` is `None`) or resolved.
    ToolCall {
        /// Name of the invoked tool.
        tool: String,
        /// The input handed to the tool, as text.
        input: String,
        /// The tool's output once it has run.
        #[serde(default)]
        output: Option<String>,
    },

    /// A fragment, or the whole, of the final answer.
    Response {
        /// The answer text.
        content: String,
    },

    /// A terminal, user-visible failure description.
    Error {
        /// Description of the failure.
        content: String,
    },
}

impl StreamEvent {
    /// Creates a [`StreamEvent::Reasoning`] event.
    pub fn reasoning(content: impl Into<String>) -> Self {
        Self::Reasoning {
            content: content.into(),
        }
    }

    /// Creates a [`StreamEvent::Response`] event.
    pub fn response(content: impl Into<String>) -> Self {
        Self::Response {
            content: content.into(),
        }
    }

    /// Creates a [`StreamEvent::Error`] event.
    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// Creates a pending [`StreamEvent::ToolCall`] announcement.
    pub fn tool_pending(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            input: input.into(),
            output: None,
        }
    }

    /// Creates a resolved [`StreamEvent::ToolCall`] carrying the tool output.
    pub fn tool_resolved(
        tool: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            tool: tool.into(),
            input: input.into(),
            output: Some(output.into()),
        }
    }

    /// The wire name of this event's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
        }
    }

    /// Returns `true` for [`StreamEvent::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
