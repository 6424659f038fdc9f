use thiserror::Error;

/// A convenience `Result` alias using [`ParleyError`].
pub type ParleyResult<T> = Result<T, ParleyError>;

/// Top-level error type for Parley.
///
/// Each variant corresponds to a subsystem that can produce errors. Tool
/// failures are deliberately absent: they are carried as
/// [`ToolResult`](crate::ToolResult) text, never as errors.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// An error originating from the agent loop (e.g. turn limit exceeded).
    #[error("Agent error: {0}")]
    Agent(String),

    /// The generation backend failed or produced a malformed stream.
    #[error("Backend error: {0}")]
    Backend(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Missing or invalid configuration, including absent credentials.
    #[error("Config error: {0}")]
    Config(String),

    /// An error in tool registration.
    #[error("Skill error: {0}")]
    Skill(String),

    /// An error from the HTTP gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// An event frame could not be encoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A request was rejected before any processing started.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
