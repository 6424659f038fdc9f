use parley_core::{ToolDeclaration, ToolResult};
use async_trait::async_trait;

/// Trait that every tool implements.
///
/// `execute` must not fail: network errors, missing credentials and bad
/// upstream responses are reported through [`ToolResult::error`] so the model
/// can be told about them.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Static declaration advertised to the backend.
    fn descriptor(&self) -> &ToolDeclaration;

    /// The text shown to the client as this call's `input`.
    ///
    /// Defaults to the first required string argument, or the arguments'
    /// JSON when there is none.
    fn describe_input(&self, arguments: &serde_json::Value) -> String {
        default_input(&self.descriptor().parameters_schema, arguments)
    }

    /// Runs the tool with arguments already validated against the schema.
    async fn execute(&self, arguments: serde_json::Value) -> ToolResult;
}

pub(crate) fn default_input(schema: &serde_json::Value, arguments: &serde_json::Value) -> String {
    schema["required"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|name| name.as_str())
        .find_map(|name| arguments[name].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| arguments.to_string())
}
