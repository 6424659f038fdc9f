use serde::{Deserialize, Serialize};

/// Static metadata advertised to the generation backend for a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool name, as the backend will refer to it.
    pub name: String,
    /// What the tool does and when to use it.
    pub description: String,
    /// JSON schema of the tool's arguments object.
    pub parameters_schema: serde_json::Value,
}

/// A request from the backend to invoke a declared tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// Freeform JSON arguments, validated only at invocation time.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Creates a tool call.
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// The text outcome of executing a [`ToolCall`].
///
/// Failures are data: `is_error` marks them, and `content` carries a
/// human-readable description that is fed back to the model like any result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that produced this result.
    pub name: String,
    /// The textual output produced by the tool.
    pub content: String,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            is_error: true,
        }
    }
}
