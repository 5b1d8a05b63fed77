//! MCP Server
//!
//! Publishes every calculator tool through an `rmcp` tool router. Argument
//! structs declare parameters in call order, which is the order clients bind
//! positional arguments in. Tool failures are `isError` results; malformed
//! arguments are rejected by the router as protocol errors.

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde::Deserialize;

use crate::error::CalcError;
use crate::tools::{self, Reply};

pub const SERVER_NAME: &str = "iterant-calc-host";

/// Two integer operands
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct Pair {
    pub a: i64,
    pub b: i64,
}

/// One integer operand
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct Operand {
    pub a: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct Numbers {
    /// Integers to add
    pub l: Vec<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct Word {
    pub string: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct Exponents {
    pub int_list: Vec<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct Count {
    /// How many numbers to return
    pub n: i64,
}

/// Shape a tool outcome for the wire
fn respond(tool: &str, outcome: Result<Reply, CalcError>) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(reply) => {
            tracing::debug!(tool, ?reply, "tool succeeded");
            Ok(CallToolResult::success(reply.into_content()))
        }
        Err(e) => {
            tracing::warn!(tool, error = %e, "tool failed");
            Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
        }
    }
}

#[derive(Clone)]
pub struct CalcServer {
    tool_router: ToolRouter<Self>,
}

impl Default for CalcServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl CalcServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    /// Names of every published tool
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect()
    }

    #[tool(description = "Add two numbers")]
    fn add(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("add", tools::add(a, b))
    }

    #[tool(description = "Add all numbers in a list")]
    fn add_list(&self, Parameters(Numbers { l }): Parameters<Numbers>) -> Result<CallToolResult, McpError> {
        respond("add_list", tools::add_list(&l))
    }

    #[tool(description = "Return the length of a string")]
    fn length_string(
        &self,
        Parameters(Word { string }): Parameters<Word>,
    ) -> Result<CallToolResult, McpError> {
        respond("length_string", tools::length_string(&string))
    }

    #[tool(description = "Subtract two numbers")]
    fn subtract(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("subtract", tools::subtract(a, b))
    }

    #[tool(description = "Multiply two numbers")]
    fn multiply(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("multiply", tools::multiply(a, b))
    }

    #[tool(description = "Divide two numbers")]
    fn divide(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("divide", tools::divide(a, b))
    }

    #[tool(description = "Raise a to the power b")]
    fn power(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("power", tools::power(a, b))
    }

    #[tool(description = "Square root of a number")]
    fn sqrt(&self, Parameters(Operand { a }): Parameters<Operand>) -> Result<CallToolResult, McpError> {
        respond("sqrt", tools::sqrt(a))
    }

    #[tool(description = "Cube root of a number")]
    fn cbrt(&self, Parameters(Operand { a }): Parameters<Operand>) -> Result<CallToolResult, McpError> {
        respond("cbrt", tools::cbrt(a))
    }

    #[tool(description = "Factorial of a number")]
    fn factorial(
        &self,
        Parameters(Operand { a }): Parameters<Operand>,
    ) -> Result<CallToolResult, McpError> {
        respond("factorial", tools::factorial(a))
    }

    #[tool(description = "Natural logarithm of a number")]
    fn log(&self, Parameters(Operand { a }): Parameters<Operand>) -> Result<CallToolResult, McpError> {
        respond("log", tools::log(a))
    }

    #[tool(description = "Remainder of dividing a by b")]
    fn remainder(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("remainder", tools::remainder(a, b))
    }

    #[tool(description = "Sine of a number")]
    fn sin(&self, Parameters(Operand { a }): Parameters<Operand>) -> Result<CallToolResult, McpError> {
        respond("sin", tools::sin(a))
    }

    #[tool(description = "Cosine of a number")]
    fn cos(&self, Parameters(Operand { a }): Parameters<Operand>) -> Result<CallToolResult, McpError> {
        respond("cos", tools::cos(a))
    }

    #[tool(description = "Tangent of a number")]
    fn tan(&self, Parameters(Operand { a }): Parameters<Operand>) -> Result<CallToolResult, McpError> {
        respond("tan", tools::tan(a))
    }

    #[tool(description = "Special mining tool")]
    fn mine(&self, Parameters(Pair { a, b }): Parameters<Pair>) -> Result<CallToolResult, McpError> {
        respond("mine", tools::mine(a, b))
    }

    #[tool(description = "Return the ASCII values of the characters in a word")]
    fn strings_to_chars_to_int(
        &self,
        Parameters(Word { string }): Parameters<Word>,
    ) -> Result<CallToolResult, McpError> {
        respond("strings_to_chars_to_int", tools::strings_to_chars_to_int(&string))
    }

    #[tool(description = "Return sum of exponentials of numbers in a list")]
    fn int_list_to_exponential_sum(
        &self,
        Parameters(Exponents { int_list }): Parameters<Exponents>,
    ) -> Result<CallToolResult, McpError> {
        respond("int_list_to_exponential_sum", tools::int_list_to_exponential_sum(&int_list))
    }

    #[tool(description = "Return the first n Fibonacci Numbers")]
    fn fibonacci_numbers(
        &self,
        Parameters(Count { n }): Parameters<Count>,
    ) -> Result<CallToolResult, McpError> {
        respond("fibonacci_numbers", tools::fibonacci_numbers(n))
    }
}

#[tool_handler]
impl ServerHandler for CalcServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Implementation::default()
            },
            instructions: Some("Integer arithmetic, list and string tools".into()),
            ..ServerInfo::default()
        }
    }
}
