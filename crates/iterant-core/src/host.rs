//! Tool Host Session
//!
//! The controller talks to tools only through [`ToolHost`]. Every method
//! takes `&mut self`, so a session can never have two calls in flight.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::registry::ToolDescriptor;

/// Text segments returned by a successful tool call, in order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub segments: Vec<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![text.into()],
        }
    }

    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Rendering used in the narrative history: `[seg1, seg2, ...]`
    pub fn render(&self) -> String {
        format!("[{}]", self.segments.join(", "))
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }
}

/// An open session with a tool host
///
/// Obtained from a concrete constructor (e.g., `StdioToolHost::open`) that
/// launches the host and completes the handshake.
#[async_trait]
pub trait ToolHost: Send {
    /// Ordered tool listing, schemas already interpreted; called once per
    /// session, right after opening
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke one tool and wait for its result. A result the host flags as
    /// an error is an `AgentError::ToolInvocation`.
    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput>;

    /// Release the host. Must be safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}
