//! Error Types
//!
//! Every variant is fatal to the run that raised it. The controller never
//! retries; a retry means a fresh run with a fresh tool host session.

use std::time::Duration;

use thiserror::Error;

use crate::registry::ParamType;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Tool host failed to start, handshake, or list its tools
    #[error("Session error: {0}")]
    Session(String),

    /// Model call did not answer within the allotted time
    #[error("Generation timed out after {}s", .0.as_secs_f64())]
    GenerationTimeout(Duration),

    /// Model call failed (transport, auth, malformed reply)
    #[error("Generation error: {0}")]
    Generation(String),

    /// Model asked for a tool the host does not expose
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Fewer raw arguments than the tool schema declares
    #[error("Not enough parameters provided for {tool}: missing '{parameter}' ({expected} expected, {provided} given)")]
    InsufficientArguments {
        tool: String,
        parameter: String,
        expected: usize,
        provided: usize,
    },

    /// A raw argument could not be converted to its declared type
    #[error("Cannot convert '{value}' to {expected} for parameter '{parameter}'")]
    TypeCoercion {
        parameter: String,
        expected: ParamType,
        value: String,
    },

    /// Tool host reported failure or the channel broke mid-call
    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

/// Fieldless discriminant of [`AgentError`], handy for matching and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Session,
    GenerationTimeout,
    Generation,
    UnknownTool,
    InsufficientArguments,
    TypeCoercion,
    ToolInvocation,
    Config,
    Io,
    Json,
    Other,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Session(_) => ErrorKind::Session,
            AgentError::GenerationTimeout(_) => ErrorKind::GenerationTimeout,
            AgentError::Generation(_) => ErrorKind::Generation,
            AgentError::UnknownTool(_) => ErrorKind::UnknownTool,
            AgentError::InsufficientArguments { .. } => ErrorKind::InsufficientArguments,
            AgentError::TypeCoercion { .. } => ErrorKind::TypeCoercion,
            AgentError::ToolInvocation(_) => ErrorKind::ToolInvocation,
            AgentError::Config(_) => ErrorKind::Config,
            AgentError::Io(_) => ErrorKind::Io,
            AgentError::Json(_) => ErrorKind::Json,
            AgentError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether the model's instruction itself was at fault
    pub fn is_instruction_error(&self) -> bool {
        matches!(
            self,
            AgentError::UnknownTool(_)
                | AgentError::InsufficientArguments { .. }
                | AgentError::TypeCoercion { .. }
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Session(msg) => format!("The tool host could not be reached: {}", msg),
            AgentError::GenerationTimeout(_) => "The model did not answer in time.".into(),
            AgentError::Generation(msg) => format!("The model service encountered an error: {}", msg),
            AgentError::UnknownTool(name) => format!("The model asked for an unknown tool '{}'.", name),
            AgentError::InsufficientArguments { tool, .. } => {
                format!("The model called '{}' with too few arguments.", tool)
            }
            AgentError::TypeCoercion { parameter, .. } => {
                format!("The model passed an invalid value for '{}'.", parameter)
            }
            AgentError::ToolInvocation(msg) => format!("Tool error: {}", msg),
            AgentError::Config(msg) => format!("Invalid configuration: {}", msg),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
