use crate::schema::validate_arguments;
use crate::skill::Skill;
use parley_core::{ParleyError, ParleyResult, ToolCall, ToolDeclaration, ToolResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Central registry for all available tools.
///
/// Built once at startup and shared read-only behind an `Arc`.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    timeout: Duration,
}

impl SkillRegistry {
    /// Creates an empty registry with the default per-call timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    /// Creates an empty registry bounding every execution by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            skills: HashMap::new(),
            timeout,
        }
    }

    /// Registers a tool. Names must be unique.
    pub fn register(&mut self, skill: Arc<dyn Skill>) -> ParleyResult<()> {
        let name = skill.descriptor().name.clone();
        if self.skills.contains_key(&name) {
            return Err(ParleyError::Skill(format!(
                "tool '{name}' is already registered"
            )));
        }
        info!(skill = %name, "Registered skill");
        self.skills.insert(name, skill);
        Ok(())
    }

    /// The skill registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    /// Whether a skill is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Declarations of every registered tool, sorted by name.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations: Vec<ToolDeclaration> = self
            .skills
            .values()
            .map(|s| s.descriptor().clone())
            .collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    /// Number of registered skills.
    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    /// Upper bound on a single tool execution.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The text shown to the client as the call's input.
    pub fn describe_input(&self, call: &ToolCall) -> String {
        match self.skills.get(&call.name) {
            Some(skill) => skill.describe_input(&call.arguments),
            None => call.arguments.to_string(),
        }
    }

    /// Executes a tool call.
    ///
    /// Every failure (unknown tool, bad arguments, timeout, tool error) comes
    /// back as an error result; this never returns `Err`.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let Some(skill) = self.skills.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::error(&call.name, format!("Error: unknown tool '{}'", call.name));
        };

        if let Err(reason) = validate_arguments(&skill.descriptor().parameters_schema, &call.arguments)
        {
            warn!(tool = %call.name, %reason, "Rejected tool arguments");
            return ToolResult::error(
                &call.name,
                format!("Error: invalid arguments for '{}': {reason}", call.name),
            );
        }

        info!(tool = %call.name, "Executing tool call");
        let execution = skill.execute(call.arguments.clone());
        let Ok(result) = tokio::time::timeout(self.timeout, execution).await else {
            let secs = self.timeout.as_secs();
            warn!(tool = %call.name, timeout_secs = secs, "Tool timed out");
            return ToolResult::error(
                &call.name,
                format!("Error: tool '{}' timed out after {secs}s", call.name),
            );
        };

        if result.is_error {
            warn!(tool = %call.name, "Tool returned an error");
        }
        result
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
