//! Error Types for the Calculator Host

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CalcError>;

/// Tool failures; each one reaches the client as an `isError` result
#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in {0}")]
    Overflow(&'static str),

    #[error("Math domain error: {0}")]
    Domain(String),
}
