//! Core types and error definitions for Parley.
//!
//! This crate provides the foundational types shared across all Parley crates:
//! error handling, the client-visible event model, tool call abstractions,
//! the conversation history threaded through model turns, and the codec that
//! frames events for the wire.
//!
//! # Main types
//!
//! - [`ParleyError`]: Unified error enum for all Parley subsystems.
//! - [`ParleyResult`]: Convenience alias for `Result<T, ParleyError>`.
//! - [`StreamEvent`]: A discrete event streamed to the client.
//! - [`ToolCall`] / [`ToolResult`] / [`ToolDeclaration`]: Tool invocation types.
//! - [`ConversationTurn`] / [`History`]: Append-only exchange history.
//! - [`frame`]: Encoding and incremental decoding of event frames.

/// Error types.
pub mod error;
/// Client-visible stream events.
pub mod event;
/// Event frame codec.
pub mod frame;
/// Conversation turns and history.
pub mod message;
/// Tool declarations, calls and results.
pub mod tool;

pub use error::{ParleyError, ParleyResult};
pub use event::StreamEvent;
pub use frame::{Frame, FrameDecoder, DONE_FRAME};
pub use message::{ConversationTurn, History, Part, Role};
pub use tool::{ToolCall, ToolDeclaration, ToolResult};
