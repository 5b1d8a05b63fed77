//! Calculator Tools
//!
//! Pure integer and float helpers exposed to the model. The server wraps
//! each one in a typed MCP tool; nothing here knows about the wire.

use rmcp::model::Content;

use crate::error::{CalcError, Result};

/// Value produced by a tool
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
}

impl Reply {
    /// Lists expand to one text segment per element
    pub fn into_content(self) -> Vec<Content> {
        match self {
            Reply::Int(i) => vec![Content::text(i.to_string())],
            Reply::Float(f) => vec![Content::text(format!("{f:?}"))],
            Reply::Ints(xs) => xs.into_iter().map(|x| Content::text(x.to_string())).collect(),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn float(x: i64) -> f64 {
    x as f64
}

pub fn add(a: i64, b: i64) -> Result<Reply> {
    a.checked_add(b).map(Reply::Int).ok_or(CalcError::Overflow("add"))
}

pub fn add_list(l: &[i64]) -> Result<Reply> {
    l.iter()
        .try_fold(0i64, |sum, x| sum.checked_add(*x))
        .map(Reply::Int)
        .ok_or(CalcError::Overflow("add_list"))
}

pub fn length_string(string: &str) -> Result<Reply> {
    i64::try_from(string.chars().count())
        .map(Reply::Int)
        .map_err(|_| CalcError::Overflow("length_string"))
}

pub fn subtract(a: i64, b: i64) -> Result<Reply> {
    a.checked_sub(b).map(Reply::Int).ok_or(CalcError::Overflow("subtract"))
}

pub fn multiply(a: i64, b: i64) -> Result<Reply> {
    a.checked_mul(b).map(Reply::Int).ok_or(CalcError::Overflow("multiply"))
}

pub fn divide(a: i64, b: i64) -> Result<Reply> {
    if b == 0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Reply::Float(float(a) / float(b)))
}

/// Negative exponents truncate toward zero, like converting the float power
/// back to an integer
#[allow(clippy::cast_possible_truncation)]
pub fn power(a: i64, b: i64) -> Result<Reply> {
    if b >= 0 {
        return u32::try_from(b)
            .ok()
            .and_then(|exp| a.checked_pow(exp))
            .map(Reply::Int)
            .ok_or(CalcError::Overflow("power"));
    }
    if a == 0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Reply::Int(float(a).powf(float(b)).trunc() as i64))
}

pub fn sqrt(a: i64) -> Result<Reply> {
    if a < 0 {
        return Err(CalcError::Domain(format!("square root of negative number {a}")));
    }
    Ok(Reply::Float(float(a).sqrt()))
}

pub fn cbrt(a: i64) -> Result<Reply> {
    Ok(Reply::Float(float(a).cbrt()))
}

pub fn factorial(a: i64) -> Result<Reply> {
    if a < 0 {
        return Err(CalcError::Domain("factorial is not defined for negative values".into()));
    }
    (1..=a)
        .try_fold(1i64, i64::checked_mul)
        .map(Reply::Int)
        .ok_or(CalcError::Overflow("factorial"))
}

pub fn log(a: i64) -> Result<Reply> {
    if a <= 0 {
        return Err(CalcError::Domain(format!("logarithm of non-positive number {a}")));
    }
    Ok(Reply::Float(float(a).ln()))
}

/// Floored remainder: the result takes the sign of the divisor
pub fn remainder(a: i64, b: i64) -> Result<Reply> {
    if b == 0 {
        return Err(CalcError::DivisionByZero);
    }
    let r = a.checked_rem(b).ok_or(CalcError::Overflow("remainder"))?;
    let floored = if r != 0 && (r < 0) != (b < 0) { r + b } else { r };
    Ok(Reply::Int(floored))
}

pub fn sin(a: i64) -> Result<Reply> {
    Ok(Reply::Float(float(a).sin()))
}

pub fn cos(a: i64) -> Result<Reply> {
    Ok(Reply::Float(float(a).cos()))
}

pub fn tan(a: i64) -> Result<Reply> {
    Ok(Reply::Float(float(a).tan()))
}

pub fn mine(a: i64, b: i64) -> Result<Reply> {
    a.checked_sub(b)
        .and_then(|x| x.checked_sub(b))
        .map(Reply::Int)
        .ok_or(CalcError::Overflow("mine"))
}

pub fn strings_to_chars_to_int(string: &str) -> Result<Reply> {
    let codes = string.chars().map(|c| i64::from(u32::from(c))).collect();
    Ok(Reply::Ints(codes))
}

pub fn int_list_to_exponential_sum(int_list: &[i64]) -> Result<Reply> {
    Ok(Reply::Float(int_list.iter().map(|x| float(*x).exp()).sum()))
}

/// First `n` Fibonacci numbers; each term is computed only once it is
/// actually returned
pub fn fibonacci_numbers(n: i64) -> Result<Reply> {
    let count = usize::try_from(n).unwrap_or(0);
    let mut sequence: Vec<i64> = Vec::new();

    for _ in 0..count {
        let term = match sequence.as_slice() {
            [] => 0,
            [_] => 1,
            [.., before, last] => before
                .checked_add(*last)
                .ok_or(CalcError::Overflow("fibonacci_numbers"))?,
        };
        sequence.push(term);
    }

    Ok(Reply::Ints(sequence))
}
