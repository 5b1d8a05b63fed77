//! Command Parser
//!
//! The model must answer with one of two single-line instructions:
//!
//! ```text
//! FUNCTION_CALL: <toolName>|<arg1>|<arg2>|...
//! FINAL_ANSWER: <payload>
//! ```
//!
//! A function call anywhere in the reply wins over a final answer; only the
//! first one is honored. Everything else in the reply is ignored.

use serde::{Deserialize, Serialize};

pub const FUNCTION_CALL_PREFIX: &str = "FUNCTION_CALL:";
pub const FINAL_ANSWER_PREFIX: &str = "FINAL_ANSWER:";

const ARG_SEPARATOR: char = '|';

/// A request to run one tool with positional, untyped arguments
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallInstruction {
    pub tool_name: String,
    pub raw_args: Vec<String>,
}

/// Classified model reply
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    ToolCall(ToolCallInstruction),
    FinalAnswer { payload: String },
    Unrecognized,
}

/// Extract the instruction from a raw model reply
pub fn parse(raw: &str) -> Instruction {
    let call_line = raw
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(FUNCTION_CALL_PREFIX));

    if let Some(body) = call_line {
        let mut fields = body.split(ARG_SEPARATOR).map(|field| field.trim().to_string());
        let tool_name = fields.next().unwrap_or_default();
        return Instruction::ToolCall(ToolCallInstruction {
            tool_name,
            raw_args: fields.collect(),
        });
    }

    match raw.trim().strip_prefix(FINAL_ANSWER_PREFIX) {
        Some(payload) => Instruction::FinalAnswer {
            payload: payload.trim().to_string(),
        },
        None => Instruction::Unrecognized,
    }
}
