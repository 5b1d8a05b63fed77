//! # iterant-core
//!
//! Bounded tool-calling loop with a provider-agnostic model gateway and a
//! pluggable tool host.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Controller                              │
//! │  ┌────────────┐  ┌─────────────┐  ┌──────────┐  ┌─────────────┐  │
//! │  │ Generation │─▶│ Instruction │─▶│ Registry │─▶│  Coercion   │  │
//! │  │  Gateway   │  │   Parser    │  │  lookup  │  │             │  │
//! │  └────────────┘  └─────────────┘  └──────────┘  └──────┬──────┘  │
//! │        ▲                                               ▼         │
//! │        └──────────── narrative history ◀──────── ToolHost        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `GenerationGateway` and `ToolHost` are the two seams: any model service
//! and any tool transport plug in without touching the loop.

pub mod coerce;
pub mod controller;
pub mod describe;
pub mod error;
pub mod gateway;
pub mod host;
pub mod instruction;
pub mod registry;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use coerce::{ArgValue, CoercedArguments, coerce};
pub use controller::{
    CompletionOutcome, CompletionStep, Controller, ControllerBuilder, ControllerConfig, IterationRecord, Phase,
    RecordOutcome, RunReport,
};
pub use describe::describe_tools;
pub use error::{AgentError, ErrorKind, Result};
pub use gateway::{GenerationGateway, GenerationOptions, generate_with_timeout};
pub use host::{ToolHost, ToolOutput};
pub use instruction::{Instruction, ToolCallInstruction};
pub use registry::{ParamType, Parameter, ToolDescriptor, ToolRegistry};
