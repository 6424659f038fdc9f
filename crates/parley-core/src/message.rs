use crate::tool::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// The role of the participant that authored a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human end-user.
    User,
    /// The generation backend.
    Model,
    /// Results of tool invocations fed back to the model.
    Tool,
}

/// One piece of content within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// Free text.
    Text {
        /// The text.
        text: String,
    },
    /// A tool call requested by the model.
    FunctionCall {
        /// The requested call.
        call: ToolCall,
    },
    /// The text result of a tool call.
    FunctionResponse {
        /// Name of the tool that produced the result.
        name: String,
        /// The result text (success or failure description).
        content: String,
    },
}

/// A single entry of the exchange history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced this turn.
    pub role: Role,
    /// Ordered content of the turn.
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    /// Creates a user turn holding the query text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// Creates a model turn from the text it produced and the calls it requested.
    pub fn model(text: &str, calls: &[ToolCall]) -> Self {
        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text {
                text: text.to_string(),
            });
        }
        parts.extend(calls.iter().cloned().map(|call| Part::FunctionCall { call }));
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Creates the tool turn answering one model turn: one function response
    /// per requested call, in call order.
    pub fn tool_results(results: &[ToolResult]) -> Self {
        Self {
            role: Role::Tool,
            parts: results
                .iter()
                .map(|result| Part::FunctionResponse {
                    name: result.name.clone(),
                    content: result.content.clone(),
                })
                .collect(),
        }
    }
}

/// Chronological, append-only record of the turns of one exchange.
///
/// Turns can only be appended; existing turns are never removed, replaced or
/// reordered, so every continuation sees the exchange exactly as it happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    turns: Vec<ConversationTurn>,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Number of turns recorded.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterates over the turns, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, ConversationTurn> {
        self.turns.iter()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a ConversationTurn;
    type IntoIter = std::slice::Iter<'a, ConversationTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
