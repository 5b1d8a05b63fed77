//! # iterant-calc-host
//!
//! An MCP tool host serving integer and string calculators over stdio.
//!
//! ```text
//! stdin  ──▶ rmcp ──▶ CalcServer (tool router) ──▶ add, divide, fibonacci_numbers, ...
//! stdout ◀── JSON-RPC responses
//! stderr ◀── logs
//! ```

pub mod error;
pub mod server;
pub mod tools;

pub use error::{CalcError, Result};
pub use server::{CalcServer, SERVER_NAME};
pub use tools::Reply;
