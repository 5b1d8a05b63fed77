//! Argument Coercion Engine
//!
//! Binds the positional raw arguments of a function call to a tool's
//! parameters, converting each to its declared type.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};
use crate::registry::{ParamType, ToolDescriptor};

/// A typed argument value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Integer(i64),
    Number(f64),
    Array(Vec<i64>),
    Text(String),
}

impl From<&ArgValue> for Value {
    fn from(value: &ArgValue) -> Self {
        match value {
            ArgValue::Integer(i) => Value::from(*i),
            ArgValue::Number(n) => Value::from(*n),
            ArgValue::Array(xs) => Value::from(xs.clone()),
            ArgValue::Text(s) => Value::from(s.as_str()),
        }
    }
}

/// Arguments bound to parameter names, in schema order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoercedArguments(Vec<(String, ArgValue)>);

impl CoercedArguments {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// The JSON object sent as `arguments` of a tool call
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value)))
            .collect()
    }
}

impl fmt::Display for CoercedArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_json_map()))
    }
}

/// Consume `raw_args` left to right in schema order.
///
/// Surplus raw arguments beyond the schema's arity are ignored.
pub fn coerce(descriptor: &ToolDescriptor, raw_args: &[String]) -> Result<CoercedArguments> {
    let mut bound = Vec::with_capacity(descriptor.parameters.len());

    for (position, param) in descriptor.parameters.iter().enumerate() {
        let Some(raw) = raw_args.get(position) else {
            return Err(AgentError::InsufficientArguments {
                tool: descriptor.name.clone(),
                parameter: param.name.clone(),
                expected: descriptor.parameters.len(),
                provided: raw_args.len(),
            });
        };
        let value = coerce_value(&param.name, param.param_type, raw)?;
        bound.push((param.name.clone(), value));
    }

    Ok(CoercedArguments(bound))
}

fn coerce_value(name: &str, param_type: ParamType, raw: &str) -> Result<ArgValue> {
    let raw = raw.trim();
    let mismatch = || AgentError::TypeCoercion {
        parameter: name.to_string(),
        expected: param_type,
        value: raw.to_string(),
    };

    match param_type {
        ParamType::Integer => raw.parse().map(ArgValue::Integer).map_err(|_| mismatch()),
        // NaN and the infinities have no JSON form
        ParamType::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(ArgValue::Number)
            .ok_or_else(mismatch),
        ParamType::Array => {
            let inner = raw.strip_prefix('[').unwrap_or(raw);
            let inner = inner.strip_suffix(']').unwrap_or(inner);
            inner
                .split(',')
                .map(|element| element.trim().parse::<i64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(ArgValue::Array)
                .map_err(|_| mismatch())
        }
        ParamType::Text => Ok(ArgValue::Text(raw.to_string())),
    }
}
