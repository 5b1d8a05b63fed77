//! In-memory doubles for driving the controller without a model service or
//! a tool host process.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::gateway::GenerationGateway;
use crate::host::{ToolHost, ToolOutput};
use crate::registry::ToolDescriptor;

/// One scripted gateway reply
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
    /// Never answers
    Stall,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    prompts: Vec<String>,
}

/// Gateway that replays canned replies and records every prompt
pub struct ScriptedGateway {
    script: Mutex<Script>,
    repeat: Option<ScriptedReply>,
}

impl ScriptedGateway {
    /// Reply with each text once, then fail
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(replies.into_iter().map(|r| ScriptedReply::Text(r.into())).collect())
    }

    pub fn from_replies(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(Script {
                replies: replies.into(),
                prompts: Vec::new(),
            }),
            repeat: None,
        }
    }

    /// Give the same reply forever
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            script: Mutex::default(),
            repeat: Some(ScriptedReply::Text(reply.into())),
        }
    }

    /// Number of `generate` calls so far
    pub fn calls(&self) -> usize {
        self.lock().prompts.len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let next = {
            let mut script = self.lock();
            script.prompts.push(prompt.to_string());
            script.replies.pop_front().or_else(|| self.repeat.clone())
        };

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(AgentError::Generation(message)),
            Some(ScriptedReply::Stall) => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(AgentError::Generation("stalled reply released".into()))
            }
            None => Err(AgentError::Generation("script exhausted".into())),
        }
    }
}

type Handler = Box<dyn Fn(&Map<String, Value>) -> std::result::Result<ToolOutput, String> + Send + Sync>;

/// Tool host backed by closures
#[derive(Default)]
pub struct MemoryToolHost {
    tools: Vec<(ToolDescriptor, Handler)>,
    calls: Vec<(String, Map<String, Value>)>,
    list_calls: usize,
    close_calls: usize,
    listing_error: Option<String>,
}

impl MemoryToolHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host whose listing always fails
    pub fn failing_listing(message: impl Into<String>) -> Self {
        Self {
            listing_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_tool<F>(mut self, descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> std::result::Result<ToolOutput, String> + Send + Sync + 'static,
    {
        self.tools.push((descriptor, Box::new(handler)));
        self
    }

    /// Every `call_tool` request, in order
    pub fn calls(&self) -> &[(String, Map<String, Value>)] {
        &self.calls
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls > 0
    }
}

#[async_trait]
impl ToolHost for MemoryToolHost {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.list_calls += 1;
        if let Some(message) = &self.listing_error {
            return Err(AgentError::Session(message.clone()));
        }
        Ok(self.tools.iter().map(|(descriptor, _)| descriptor.clone()).collect())
    }

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        if self.is_closed() {
            return Err(AgentError::Session("session closed".into()));
        }
        self.calls.push((name.to_string(), arguments.clone()));

        let (_, handler) = self
            .tools
            .iter()
            .find(|(descriptor, _)| descriptor.name == name)
            .ok_or_else(|| AgentError::ToolInvocation(format!("Unknown tool: {name}")))?;
        handler(&arguments).map_err(AgentError::ToolInvocation)
    }

    async fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        Ok(())
    }
}
