//! Iteration Controller
//!
//! Bounded decision loop. Each iteration asks the model for one instruction,
//! dispatches tool calls to the host and folds the result into a narrative
//! that is replayed in the next prompt.
//!
//! ```text
//!  Init ──▶ Running ──▶ Running ... ──┬──▶ Finalized   (FINAL_ANSWER)
//!                                      ├──▶ Exhausted   (budget spent)
//!                                      └──▶ Failed      (any fatal error)
//! ```
//!
//! Every terminal state closes the tool host session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::coerce::{CoercedArguments, coerce};
use crate::describe::describe_tools;
use crate::error::{AgentError, Result};
use crate::gateway::{DEFAULT_GENERATION_TIMEOUT, GenerationGateway, generate_with_timeout};
use crate::host::{ToolHost, ToolOutput};
use crate::instruction::{self, Instruction, ToolCallInstruction};
use crate::registry::ToolRegistry;

pub const DEFAULT_MAX_ITERATIONS: usize = 3;

const TOOLS_PLACEHOLDER: &str = "{tools}";
const ANSWER_PLACEHOLDER: &str = "{answer}";
const NEXT_STEP_CUE: &str = "What should I do next?";

/// Default system prompt; `{tools}` is replaced by the tool menu
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an agent that solves problems step by step, one tool call at a time.

Available tools:
{tools}

Reply with EXACTLY ONE line in one of these two formats and nothing else:
1. To call a tool:
   FUNCTION_CALL: tool_name|param1|param2|...
2. To finish:
   FINAL_ANSWER: [answer]

Rules:
- Parameters are positional, in the order the tool lists them
- Pass an array parameter as a single comma-separated field, e.g. int_list_to_exponential_sum|73,78,68
- When a tool returns several values, use all of them
- Do not repeat a call with the same parameters
- Only give FINAL_ANSWER once every needed calculation is done

Examples:
- FUNCTION_CALL: add|5|3
- FUNCTION_CALL: strings_to_chars_to_int|INDIA
- FINAL_ANSWER: [42]"#;

/// A tool invoked after the final answer for its side effect
/// (drawing the answer, sending it somewhere).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompletionStep {
    /// Tool name on the host
    pub tool: String,

    /// Argument template; `{answer}` in any string is replaced by the payload
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Pause after the call, for effects that settle asynchronously
    #[serde(default)]
    pub settle_ms: u64,
}

impl CompletionStep {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments: Map::new(),
            settle_ms: 0,
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn settle(mut self, pause: Duration) -> Self {
        self.settle_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Arguments with `{answer}` substituted
    pub fn render_arguments(&self, answer: &str) -> Map<String, Value> {
        self.arguments
            .iter()
            .map(|(name, value)| (name.clone(), substitute_answer(value, answer)))
            .collect()
    }
}

fn substitute_answer(value: &Value, answer: &str) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace(ANSWER_PLACEHOLDER, answer)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_answer(v, answer)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), substitute_answer(v, answer)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Controller configuration
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Iteration budget
    pub max_iterations: usize,

    /// Time allowed for each model reply
    pub generation_timeout: Duration,

    /// Tools run after a final answer, in order
    pub completion_steps: Vec<CompletionStep>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            completion_steps: Vec::new(),
        }
    }
}

/// Lifecycle of one run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Running,
    Finalized,
    Exhausted,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finalized | Phase::Exhausted | Phase::Failed)
    }
}

/// How a recorded tool call ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum RecordOutcome {
    Returned(String),
    Failed(String),
}

/// One tool call that reached an outcome. Never mutated once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub index: usize,
    pub tool_name: String,
    pub arguments: CoercedArguments,
    pub outcome: RecordOutcome,
}

impl IterationRecord {
    /// Sentence replayed to the model in later prompts
    pub fn narrative(&self) -> String {
        match &self.outcome {
            RecordOutcome::Returned(result) => format!(
                "In the {} iteration you called {} with {} parameters, and the function returned {}.",
                self.index, self.tool_name, self.arguments, result
            ),
            RecordOutcome::Failed(error) => format!("Error in iteration {}: {}", self.index, error),
        }
    }
}

/// Mutable state of exactly one run
#[derive(Debug)]
pub struct ControllerState {
    pub iteration_count: usize,
    pub max_iterations: usize,
    pub history: Vec<IterationRecord>,
    pub last_result: Option<ToolOutput>,
    pub phase: Phase,
}

impl ControllerState {
    fn new(max_iterations: usize) -> Self {
        Self {
            iteration_count: 0,
            max_iterations,
            history: Vec::new(),
            last_result: None,
            phase: Phase::Init,
        }
    }

    fn has_budget(&self) -> bool {
        self.iteration_count < self.max_iterations
    }

    fn record_success(&mut self, index: usize, tool_name: String, arguments: CoercedArguments, output: ToolOutput) {
        self.history.push(IterationRecord {
            index,
            tool_name,
            arguments,
            outcome: RecordOutcome::Returned(output.render()),
        });
        self.last_result = Some(output);
    }

    /// Record the error of an in-progress tool call and hand it back
    fn record_failure(
        &mut self,
        index: usize,
        tool_name: &str,
        arguments: CoercedArguments,
        error: AgentError,
    ) -> AgentError {
        self.history.push(IterationRecord {
            index,
            tool_name: tool_name.to_string(),
            arguments,
            outcome: RecordOutcome::Failed(error.to_string()),
        });
        error
    }
}

/// Result of one completion tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub tool: String,
    pub outcome: RecordOutcome,
}

/// Everything a caller learns about a finished run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub phase: Phase,

    /// Final answer payload, set when `phase` is `Finalized`
    pub answer: Option<String>,

    /// The fatal error, set when `phase` is `Failed`
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<AgentError>,

    pub iterations: usize,
    pub history: Vec<IterationRecord>,
    pub last_result: Option<ToolOutput>,
    pub completions: Vec<CompletionOutcome>,
}

fn serialize_error<S: Serializer>(error: &Option<AgentError>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl RunReport {
    pub fn is_finalized(&self) -> bool {
        self.phase == Phase::Finalized
    }

    /// Wall-clock duration of the run
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

enum Step {
    Continue,
    Finish(String),
}

/// The decision loop
pub struct Controller {
    gateway: Arc<dyn GenerationGateway>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(gateway: Arc<dyn GenerationGateway>, config: ControllerConfig) -> Self {
        Self { gateway, config }
    }

    /// Create with default configuration
    pub fn with_defaults(gateway: Arc<dyn GenerationGateway>) -> Self {
        Self::new(gateway, ControllerConfig::default())
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// System prompt with the tool menu filled in
    pub fn render_system_prompt(&self, registry: &ToolRegistry) -> String {
        let menu = describe_tools(registry.descriptors());
        if self.config.system_prompt.contains(TOOLS_PLACEHOLDER) {
            self.config.system_prompt.replace(TOOLS_PLACEHOLDER, &menu)
        } else {
            format!("{}\n\nAvailable tools:\n{}", self.config.system_prompt, menu)
        }
    }

    /// Run one query to a terminal state, then close `host`.
    ///
    /// State is created fresh for every call. If the returned future is
    /// dropped early the host is not closed here; hosts must release
    /// their process on drop as well.
    pub async fn run<H: ToolHost + ?Sized>(&self, host: &mut H, query: &str) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = ControllerState::new(self.config.max_iterations);
        let mut completions = Vec::new();

        tracing::info!(%run_id, max_iterations = state.max_iterations, "run started");
        let outcome = self.drive(&mut state, host, query, &mut completions).await;

        if let Err(e) = host.close().await {
            tracing::warn!(%run_id, error = %e, "tool host teardown failed");
        }

        let (answer, error) = match outcome {
            Ok(answer) => (answer, None),
            Err(e) => {
                tracing::warn!(%run_id, iteration = state.iteration_count, error = %e, "run failed");
                state.phase = Phase::Failed;
                (None, Some(e))
            }
        };
        tracing::info!(%run_id, phase = ?state.phase, iterations = state.iteration_count, "run finished");

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            phase: state.phase,
            answer,
            error,
            iterations: state.iteration_count,
            history: state.history,
            last_result: state.last_result,
            completions,
        }
    }

    async fn drive<H: ToolHost + ?Sized>(
        &self,
        state: &mut ControllerState,
        host: &mut H,
        query: &str,
        completions: &mut Vec<CompletionOutcome>,
    ) -> Result<Option<String>> {
        let registry = ToolRegistry::from_descriptors(host.list_tools().await?)?;
        tracing::info!(tools = registry.len(), "tool registry ready");
        let system_prompt = self.render_system_prompt(&registry);
        state.phase = Phase::Running;

        while state.has_budget() {
            if let Step::Finish(answer) = self.step(state, host, &registry, &system_prompt, query).await? {
                *completions = self.run_completion_steps(host, &answer).await;
                state.phase = Phase::Finalized;
                return Ok(Some(answer));
            }
        }

        tracing::warn!(max_iterations = state.max_iterations, "iteration budget exhausted");
        state.phase = Phase::Exhausted;
        Ok(None)
    }

    async fn step<H: ToolHost + ?Sized>(
        &self,
        state: &mut ControllerState,
        host: &mut H,
        registry: &ToolRegistry,
        system_prompt: &str,
        query: &str,
    ) -> Result<Step> {
        let prompt = build_prompt(system_prompt, query, &state.history);
        let reply = generate_with_timeout(Arc::clone(&self.gateway), prompt, self.config.generation_timeout).await?;

        let index = state.iteration_count + 1;
        tracing::debug!(iteration = index, reply = %reply.trim(), "model replied");

        match instruction::parse(&reply) {
            Instruction::Unrecognized => {
                state.iteration_count = index;
                tracing::warn!(iteration = index, reply = %reply.trim(), "no instruction in model reply, iteration consumed");
                Ok(Step::Continue)
            }
            Instruction::FinalAnswer { payload } => {
                tracing::info!(iteration = index, answer = %payload, "final answer");
                Ok(Step::Finish(payload))
            }
            Instruction::ToolCall(call) => {
                state.iteration_count = index;
                self.dispatch(state, host, registry, index, call).await?;
                Ok(Step::Continue)
            }
        }
    }

    async fn dispatch<H: ToolHost + ?Sized>(
        &self,
        state: &mut ControllerState,
        host: &mut H,
        registry: &ToolRegistry,
        index: usize,
        call: ToolCallInstruction,
    ) -> Result<()> {
        let name = call.tool_name.as_str();

        let Some(descriptor) = registry.get(name) else {
            tracing::debug!(available = ?registry.names(), "unknown tool requested");
            let error = AgentError::UnknownTool(name.to_string());
            return Err(state.record_failure(index, name, CoercedArguments::default(), error));
        };

        let arguments = match coerce(descriptor, &call.raw_args) {
            Ok(arguments) => arguments,
            Err(e) => return Err(state.record_failure(index, name, CoercedArguments::default(), e)),
        };
        if call.raw_args.len() > descriptor.parameters.len() {
            tracing::warn!(
                tool = name,
                expected = descriptor.parameters.len(),
                provided = call.raw_args.len(),
                "surplus arguments ignored"
            );
        }

        tracing::info!(iteration = index, tool = name, arguments = %arguments, "calling tool");
        match host.call_tool(name, arguments.to_json_map()).await {
            Ok(output) => {
                tracing::info!(iteration = index, tool = name, result = %output.render(), "tool returned");
                state.record_success(index, call.tool_name, arguments, output);
                Ok(())
            }
            Err(e) => Err(state.record_failure(index, name, arguments, e)),
        }
    }

    /// Run completion tools in order, stopping at the first failure
    async fn run_completion_steps<H: ToolHost + ?Sized>(&self, host: &mut H, answer: &str) -> Vec<CompletionOutcome> {
        let mut outcomes = Vec::with_capacity(self.config.completion_steps.len());

        for step in &self.config.completion_steps {
            let outcome = match host.call_tool(&step.tool, step.render_arguments(answer)).await {
                Ok(output) => {
                    tracing::info!(tool = %step.tool, result = %output.render(), "completion tool finished");
                    RecordOutcome::Returned(output.render())
                }
                Err(e) => {
                    tracing::warn!(tool = %step.tool, error = %e, "completion tool failed");
                    RecordOutcome::Failed(e.to_string())
                }
            };
            let failed = matches!(outcome, RecordOutcome::Failed(_));
            outcomes.push(CompletionOutcome {
                tool: step.tool.clone(),
                outcome,
            });
            if failed {
                break;
            }
            if step.settle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.settle_ms)).await;
            }
        }

        outcomes
    }
}

/// Prompt for the next iteration: the bare query until something has been
/// recorded, then the query followed by the whole narrative.
pub fn build_prompt(system_prompt: &str, query: &str, history: &[IterationRecord]) -> String {
    if history.is_empty() {
        return format!("{system_prompt}\n\nQuery: {query}");
    }
    let narrative = history
        .iter()
        .map(IterationRecord::narrative)
        .collect::<Vec<_>>()
        .join(" ");
    format!("{system_prompt}\n\nQuery: {query}\n\n{narrative}  {NEXT_STEP_CUE}")
}

/// Builder for [`Controller`]
pub struct ControllerBuilder {
    gateway: Option<Arc<dyn GenerationGateway>>,
    config: ControllerConfig,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            gateway: None,
            config: ControllerConfig::default(),
        }
    }

    pub fn gateway(mut self, gateway: Arc<dyn GenerationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    pub fn completion_step(mut self, step: CompletionStep) -> Self {
        self.config.completion_steps.push(step);
        self
    }

    pub fn completion_steps(mut self, steps: Vec<CompletionStep>) -> Self {
        self.config.completion_steps = steps;
        self
    }

    pub fn build(self) -> Result<Controller> {
        let gateway = self
            .gateway
            .ok_or_else(|| AgentError::Config("Gateway is required".into()))?;
        if self.config.generation_timeout.is_zero() {
            return Err(AgentError::Config("generation timeout must be positive".into()));
        }

        Ok(Controller::new(gateway, self.config))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::coerce::ArgValue;
    use crate::error::ErrorKind;
    use crate::registry::{ParamType, ToolDescriptor};
    use crate::testing::{MemoryToolHost, ScriptedGateway, ScriptedReply};

    const QUERY: &str = "What is 5 + 3?";

    fn add_host() -> MemoryToolHost {
        MemoryToolHost::new().with_tool(
            ToolDescriptor::new("add", "Add two numbers")
                .param("a", ParamType::Integer)
                .param("b", ParamType::Integer),
            |args| {
                let a = args["a"].as_i64().ok_or("a is not an integer")?;
                let b = args["b"].as_i64().ok_or("b is not an integer")?;
                Ok(ToolOutput::text((a + b).to_string()))
            },
        )
    }

    fn controller(gateway: &Arc<ScriptedGateway>, max_iterations: usize) -> Controller {
        ControllerBuilder::new()
            .gateway(gateway.clone())
            .max_iterations(max_iterations)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_path() {
        let gateway = Arc::new(ScriptedGateway::new(["FUNCTION_CALL: add|5|3", "FINAL_ANSWER: [8]"]));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Finalized);
        assert_eq!(report.answer.as_deref(), Some("[8]"));
        assert!(report.error.is_none());
        assert_eq!(report.history.len(), 1);
        assert_eq!(report.history[0].index, 1);
        assert_eq!(report.history[0].arguments.get("a"), Some(&ArgValue::Integer(5)));
        assert_eq!(report.history[0].arguments.get("b"), Some(&ArgValue::Integer(3)));
        assert_eq!(report.last_result, Some(ToolOutput::text("8")));

        assert_eq!(host.calls().len(), 1);
        assert_eq!(host.calls()[0].0, "add");
        assert_eq!(Value::Object(host.calls()[0].1.clone()), json!({"a": 5, "b": 3}));
        assert_eq!(host.list_calls(), 1);
        assert_eq!(host.close_calls(), 1);
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_prompts_replay_the_narrative() {
        let gateway = Arc::new(ScriptedGateway::new(["FUNCTION_CALL: add|5|3", "FINAL_ANSWER: [8]"]));
        let mut host = add_host();
        controller(&gateway, 3).run(&mut host, QUERY).await;

        let prompts = gateway.prompts();
        assert!(prompts[0].contains("1. add(a: integer, b: integer) - Add two numbers"));
        assert!(prompts[0].ends_with("Query: What is 5 + 3?"));
        assert!(prompts[1].ends_with(
            "Query: What is 5 + 3?\n\nIn the 1 iteration you called add with {\"a\":5,\"b\":3} parameters, \
             and the function returned [8].  What should I do next?"
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_after_one_call() {
        let gateway = Arc::new(ScriptedGateway::repeating("FUNCTION_CALL: ghost|1"));
        let mut host = add_host();

        let report = controller(&gateway, 5).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.error.as_ref().map(AgentError::kind), Some(ErrorKind::UnknownTool));
        assert_eq!(report.history.len(), 1);
        assert_eq!(
            report.history[0].outcome,
            RecordOutcome::Failed("Unknown tool: ghost".into())
        );
        assert_eq!(report.history[0].narrative(), "Error in iteration 1: Unknown tool: ghost");
        assert_eq!(gateway.calls(), 1);
        assert!(host.calls().is_empty());
        assert_eq!(host.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_replies_exhaust_budget() {
        let gateway = Arc::new(ScriptedGateway::repeating("I am thinking"));
        let mut host = add_host();

        let report = controller(&gateway, 2).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Exhausted);
        assert_eq!(report.iterations, 2);
        assert!(report.error.is_none());
        assert!(report.history.is_empty());
        assert!(report.answer.is_none());
        assert_eq!(gateway.calls(), 2);
        assert_eq!(host.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_reply_keeps_first_prompt_form() {
        let gateway = Arc::new(ScriptedGateway::new([
            "Let me think about it",
            "FUNCTION_CALL: add|1|2",
            "FINAL_ANSWER: [3]",
        ]));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Finalized);
        assert_eq!(report.history.len(), 1);
        assert_eq!(report.history[0].index, 2);
        let prompts = gateway.prompts();
        assert_eq!(prompts[0], prompts[1]);
        assert!(prompts[2].contains("In the 2 iteration you called add"));
    }

    #[tokio::test]
    async fn test_budget_spent_on_tool_calls() {
        let gateway = Arc::new(ScriptedGateway::repeating("FUNCTION_CALL: add|1|1"));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Exhausted);
        assert_eq!(report.iterations, 3);
        assert_eq!(report.history.len(), 3);
        assert_eq!(host.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_coercion_error_is_recorded_and_fatal() {
        let gateway = Arc::new(ScriptedGateway::repeating("FUNCTION_CALL: add|5|five"));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.error.as_ref().map(AgentError::kind), Some(ErrorKind::TypeCoercion));
        assert_eq!(report.history.len(), 1);
        assert!(matches!(report.history[0].outcome, RecordOutcome::Failed(ref m) if m.contains("five")));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_arguments_are_fatal() {
        let gateway = Arc::new(ScriptedGateway::repeating("FUNCTION_CALL: add|5"));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(
            report.error.as_ref().map(AgentError::kind),
            Some(ErrorKind::InsufficientArguments)
        );
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_surplus_arguments_are_ignored() {
        let gateway = Arc::new(ScriptedGateway::new(["FUNCTION_CALL: add|1|2|3", "FINAL_ANSWER: [3]"]));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Finalized);
        assert_eq!(Value::Object(host.calls()[0].1.clone()), json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_invocation_error_keeps_coerced_arguments() {
        let gateway = Arc::new(ScriptedGateway::repeating("FUNCTION_CALL: divide|1|0"));
        let mut host = MemoryToolHost::new().with_tool(
            ToolDescriptor::new("divide", "Divide")
                .param("a", ParamType::Integer)
                .param("b", ParamType::Integer),
            |_| Err("division by zero".into()),
        );

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.error.as_ref().map(AgentError::kind), Some(ErrorKind::ToolInvocation));
        assert_eq!(report.history[0].arguments.len(), 2);
        assert!(report.last_result.is_none());
        assert_eq!(host.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_records_nothing() {
        let gateway = Arc::new(ScriptedGateway::from_replies(vec![ScriptedReply::Stall]));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(
            report.error.as_ref().map(AgentError::kind),
            Some(ErrorKind::GenerationTimeout)
        );
        assert!(report.history.is_empty());
        assert_eq!(report.iterations, 0);
        assert_eq!(host.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_generation_error_is_fatal() {
        let gateway = Arc::new(ScriptedGateway::from_replies(vec![ScriptedReply::Fail(
            "GEMINI_API_KEY is not set".into(),
        )]));
        let mut host = add_host();

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.error.as_ref().map(AgentError::kind), Some(ErrorKind::Generation));
        assert_eq!(host.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_still_closes_host() {
        let gateway = Arc::new(ScriptedGateway::repeating("FINAL_ANSWER: [1]"));
        let mut host = MemoryToolHost::failing_listing("handshake incomplete");

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(report.error.as_ref().map(AgentError::kind), Some(ErrorKind::Session));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(host.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_tool_names_fail_init() {
        let gateway = Arc::new(ScriptedGateway::repeating("FINAL_ANSWER: [1]"));
        let mut host = add_host().with_tool(ToolDescriptor::new("add", "again"), |_| Ok(ToolOutput::default()));

        let report = controller(&gateway, 3).run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Failed);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_completion_steps_receive_the_answer() {
        let gateway = Arc::new(ScriptedGateway::new(["FINAL_ANSWER: [8]"]));
        let mut host = add_host()
            .with_tool(ToolDescriptor::new("open_paint", "Open Paint"), |_| {
                Ok(ToolOutput::text("Paint opened"))
            })
            .with_tool(
                ToolDescriptor::new("add_text_in_paint", "Write text").param("text", ParamType::Text),
                |args| Ok(ToolOutput::text(format!("Text added: {}", args["text"]))),
            );
        let controller = ControllerBuilder::new()
            .gateway(gateway.clone())
            .completion_step(CompletionStep::new("open_paint"))
            .completion_step(
                CompletionStep::new("add_text_in_paint").with_argument("text", "Answer: {answer}"),
            )
            .build()
            .unwrap();

        let report = controller.run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Finalized);
        assert_eq!(report.completions.len(), 2);
        assert_eq!(host.calls()[1].0, "add_text_in_paint");
        assert_eq!(host.calls()[1].1["text"], json!("Answer: [8]"));
        assert!(report.history.is_empty());
    }

    #[tokio::test]
    async fn test_completion_failure_keeps_answer() {
        let gateway = Arc::new(ScriptedGateway::new(["FINAL_ANSWER: [8]"]));
        let mut host = add_host();
        let controller = ControllerBuilder::new()
            .gateway(gateway.clone())
            .completion_step(CompletionStep::new("send_email"))
            .completion_step(CompletionStep::new("open_paint"))
            .build()
            .unwrap();

        let report = controller.run(&mut host, QUERY).await;

        assert_eq!(report.phase, Phase::Finalized);
        assert_eq!(report.answer.as_deref(), Some("[8]"));
        assert_eq!(report.completions.len(), 1);
        assert!(matches!(report.completions[0].outcome, RecordOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_each_run_starts_fresh() {
        let gateway = Arc::new(ScriptedGateway::new([
            "FUNCTION_CALL: add|5|3",
            "FINAL_ANSWER: [8]",
            "FUNCTION_CALL: add|1|1",
            "FINAL_ANSWER: [2]",
        ]));
        let controller = controller(&gateway, 3);

        let first = controller.run(&mut add_host(), QUERY).await;
        let second = controller.run(&mut add_host(), QUERY).await;

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(second.history.len(), 1);
        assert_eq!(second.history[0].index, 1);
        assert_eq!(second.answer.as_deref(), Some("[2]"));
    }

    #[test]
    fn test_build_prompt_forms() {
        assert_eq!(build_prompt("SYS", "q", &[]), "SYS\n\nQuery: q");

        let history = vec![
            IterationRecord {
                index: 1,
                tool_name: "strings_to_chars_to_int".into(),
                arguments: CoercedArguments::default(),
                outcome: RecordOutcome::Returned("[73, 78]".into()),
            },
            IterationRecord {
                index: 2,
                tool_name: "int_list_to_exponential_sum".into(),
                arguments: CoercedArguments::default(),
                outcome: RecordOutcome::Returned("[1.2e31]".into()),
            },
        ];
        let prompt = build_prompt("SYS", "q", &history);
        assert!(prompt.starts_with("SYS\n\nQuery: q\n\nIn the 1 iteration"));
        assert!(prompt.contains("returned [73, 78]. In the 2 iteration"));
        assert!(prompt.ends_with("returned [1.2e31].  What should I do next?"));
    }

    #[test]
    fn test_system_prompt_without_placeholder_appends_menu() {
        let gateway: Arc<dyn GenerationGateway> = Arc::new(ScriptedGateway::new(Vec::<String>::new()));
        let controller = ControllerBuilder::new()
            .gateway(gateway)
            .system_prompt("Be brief.")
            .build()
            .unwrap();
        let registry =
            ToolRegistry::from_descriptors(vec![ToolDescriptor::new("sqrt", "Square root").param("a", ParamType::Integer)])
                .unwrap();

        assert_eq!(
            controller.render_system_prompt(&registry),
            "Be brief.\n\nAvailable tools:\n1. sqrt(a: integer) - Square root"
        );
    }

    #[test]
    fn test_builder_requires_gateway() {
        assert!(matches!(ControllerBuilder::new().build(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_completion_step_substitution_is_deep() {
        let step = CompletionStep::new("send_email")
            .with_argument("subject", "Final Answer from Agent")
            .with_argument("body", json!({"lines": ["Answer: {answer}"], "count": 1}));
        let rendered = step.render_arguments("[5]");
        assert_eq!(rendered["subject"], json!("Final Answer from Agent"));
        assert_eq!(rendered["body"], json!({"lines": ["Answer: [5]"], "count": 1}));
    }

    #[test]
    fn test_completion_step_deserializes_with_defaults() {
        let step: CompletionStep = serde_json::from_value(json!({"tool": "open_paint"})).unwrap();
        assert_eq!(step, CompletionStep::new("open_paint"));
    }
}
