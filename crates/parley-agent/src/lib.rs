//! The agentic loop behind Parley.
//!
//! - [`backends`]: the [`LlmBackend`](backends::LlmBackend) boundary and the
//!   Gemini implementation.
//! - [`llm`]: [`LlmClient`], the lazily initialised, shared backend handle.
//! - [`turn`]: [`ModelTurn`], one streamed generation turn reduced to text
//!   deltas plus a final summary.
//! - [`runner`]: [`AgentRunner`] and the per-query [`Orchestration`] state
//!   machine that turns a query into stream events.

/// Generation backends and their chunk stream.
pub mod backends;
/// Model and agent settings.
pub mod config;
/// Lazily initialised backend client.
pub mod llm;
/// Query orchestration.
pub mod runner;
pub mod turn;

pub use config::{AgentConfig, FirstTurnText, LlmProvider, ModelConfig};
pub use llm::LlmClient;
pub use runner::{AgentRunner, Orchestration};
pub use turn::{ModelTurn, TurnEvent, TurnSummary};
