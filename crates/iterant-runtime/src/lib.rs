//! # iterant-runtime
//!
//! Concrete gateways and transports for the iterant loop.
//!
//! ## Gateways
//!
//! - **Gemini**: `generateContent` REST endpoint
//! - **Ollama** (default feature): Local LLM inference via Ollama
//!
//! ## Tool hosts
//!
//! - **Stdio**: MCP client session (`rmcp`) with a child process
//!
//! ## Usage
//!
//! ```rust,ignore
//! use iterant_runtime::{GeminiGateway, HostCommand, StdioToolHost};
//!
//! let controller = ControllerBuilder::new()
//!     .gateway(Arc::new(GeminiGateway::from_env()))
//!     .build()?;
//! let mut host = StdioToolHost::open(&HostCommand::new("iterant-calc-host")).await?;
//! let report = controller.run(&mut host, "What is 5 + 3?").await;
//! ```

pub mod gemini;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod stdio;

pub use gemini::{GeminiConfig, GeminiGateway};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaGateway};
pub use stdio::{HostCommand, StdioToolHost};

// Re-export core types for convenience
pub use iterant_core::{AgentError, Controller, ControllerBuilder, GenerationGateway, Result, RunReport, ToolHost};
