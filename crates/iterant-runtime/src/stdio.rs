//! Stdio Tool Host
//!
//! Launches a tool host as a child process and talks MCP to it over the
//! child's stdin/stdout through an `rmcp` client session. The child's stderr
//! is inherited so its logs land next to ours.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use iterant_core::error::{AgentError, Result};
use iterant_core::host::{ToolHost, ToolOutput};
use iterant_core::registry::ToolDescriptor;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content, Implementation, RawContent, Tool};
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value, json};
use tokio::process::Command;

/// How long the session gets to wind down before it is dropped
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type ClientSession = RunningService<RoleClient, ()>;

/// How to launch a tool host process
#[derive(Clone, Debug, Default)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Session with a tool host child process
pub struct StdioToolHost {
    session: Option<ClientSession>,
}

impl StdioToolHost {
    /// Launch the host and complete the `initialize` handshake.
    ///
    /// The child is killed if this session is dropped without `close`.
    pub async fn open(command: &HostCommand) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| AgentError::Session(format!("failed to launch tool host '{}': {e}", command.program)))?;
        let session = ().serve(transport).await.map_err(|e| {
            AgentError::Session(format!("initialize handshake with '{}' failed: {e}", command.program))
        })?;

        if let Some(info) = session.peer_info() {
            tracing::info!(
                program = %command.program,
                server = %info.server_info.name,
                version = %info.server_info.version,
                protocol = ?info.protocol_version,
                "tool host initialized"
            );
        }

        Ok(Self {
            session: Some(session),
        })
    }

    /// Identity the host announced during the handshake
    pub fn server_info(&self) -> Option<&Implementation> {
        self.session
            .as_ref()?
            .peer_info()
            .map(|info| &info.server_info)
    }

    fn session(&self) -> Result<&ClientSession> {
        self.session
            .as_ref()
            .ok_or_else(|| AgentError::Session("session closed".into()))
    }
}

#[async_trait]
impl ToolHost for StdioToolHost {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        let peer = self.session()?.peer().clone();
        let tools = peer
            .list_all_tools()
            .await
            .map_err(|e| AgentError::Session(format!("tool listing failed: {e}")))?;

        tracing::debug!(count = tools.len(), "tool listing received");
        Ok(tools.iter().map(descriptor).collect())
    }

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let peer = self.session()?.peer().clone();
        let params: CallToolRequestParam = serde_json::from_value(json!({
            "name": name,
            "arguments": arguments,
        }))
        .map_err(|e| AgentError::ToolInvocation(format!("malformed tool call: {e}")))?;

        let result = peer
            .call_tool(params)
            .await
            .map_err(|e| AgentError::ToolInvocation(e.to_string()))?;
        tool_output(result)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        match tokio::time::timeout(CLOSE_GRACE, session.cancel()).await {
            Ok(Ok(reason)) => {
                tracing::debug!(?reason, "tool host session closed");
                Ok(())
            }
            Ok(Err(e)) => Err(AgentError::Session(format!("tool host session ended abnormally: {e}"))),
            Err(_) => {
                tracing::warn!("tool host session did not wind down in time, dropping it");
                Ok(())
            }
        }
    }
}

fn descriptor(tool: &Tool) -> ToolDescriptor {
    ToolDescriptor::from_schema(tool.name.to_string(), tool.description.as_deref(), &tool.input_schema)
}

/// `isError` results become invocation errors carrying the host's text
fn tool_output(result: CallToolResult) -> Result<ToolOutput> {
    let segments: Vec<String> = result.content.iter().map(render_content).collect();
    if result.is_error.unwrap_or(false) {
        return Err(AgentError::ToolInvocation(segments.join("\n")));
    }
    Ok(ToolOutput::new(segments))
}

fn render_content(content: &Content) -> String {
    match &content.raw {
        RawContent::Text(text) => text.text.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
