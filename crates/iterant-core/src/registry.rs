//! Tool Descriptor Registry
//!
//! The ordered, typed view of the tools a host exposes. Built once per run
//! from the host's listing; parameter types are resolved here so nothing
//! downstream re-interprets schema strings.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Declared type of a tool parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Integer,
    Number,
    Array,
    /// Anything the schema does not declare as one of the above
    #[serde(rename = "string")]
    Text,
}

impl ParamType {
    /// Resolve a JSON Schema `type` string; unknown types fall back to text
    pub fn from_schema_type(declared: &str) -> Self {
        match declared {
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "array" => ParamType::Array,
            _ => ParamType::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Array => "array",
            ParamType::Text => "string",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One positional parameter of a tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

/// A tool's name, description and ordered parameter schema
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter; order of calls is binding order
    pub fn param(mut self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            param_type,
        });
        self
    }

    /// Interpret the JSON Schema object a host announces for a tool.
    /// Parameter order is the order of `properties` as sent on the wire.
    pub fn from_schema(
        name: impl Into<String>,
        description: Option<&str>,
        input_schema: &Map<String, Value>,
    ) -> Self {
        let parameters = input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, info)| Parameter {
                        name: name.clone(),
                        param_type: info
                            .get("type")
                            .and_then(Value::as_str)
                            .map_or(ParamType::Text, ParamType::from_schema_type),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.unwrap_or_default().to_string(),
            parameters,
        }
    }
}

/// Ordered registry of the tools available to one run
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    descriptors: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from descriptors, keeping their order. Names must be unique.
    pub fn from_descriptors(descriptors: Vec<ToolDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Register a new tool at the end of the menu
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(AgentError::Session(format!(
                "duplicate tool name in listing: {}",
                descriptor.name
            )));
        }
        self.index.insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn schema(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_from_schema_keeps_property_order() {
        let tool = ToolDescriptor::from_schema(
            "draw_rectangle",
            Some("Draw a rectangle"),
            &schema(json!({"type": "object", "properties": {
                "x1": {"type": "integer"},
                "y1": {"type": "integer"},
                "x2": {"type": "integer"},
                "y2": {"type": "integer"},
            }})),
        );
        let names: Vec<_> = tool.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["x1", "y1", "x2", "y2"]);
        assert_eq!(tool.description, "Draw a rectangle");
    }

    #[test]
    fn test_unrecognized_types_become_text() {
        let tool = ToolDescriptor::from_schema(
            "mixed",
            None,
            &schema(json!({"properties": {
                "flag": {"type": "boolean"},
                "anything": {},
                "ratio": {"type": "number"},
                "xs": {"type": "array", "items": {"type": "integer"}},
            }})),
        );
        let types: Vec<_> = tool.parameters.iter().map(|p| p.param_type).collect();
        assert_eq!(
            types,
            [ParamType::Text, ParamType::Text, ParamType::Number, ParamType::Array]
        );
    }

    #[test]
    fn test_schema_without_properties() {
        let tool = ToolDescriptor::from_schema("open_paint", None, &Map::new());
        assert!(tool.parameters.is_empty());
        assert_eq!(tool.description, "");
    }

    #[test]
    fn test_builder_matches_schema() {
        let built = ToolDescriptor::new("add", "Add two numbers")
            .param("a", ParamType::Integer)
            .param("b", ParamType::Integer);
        let announced = ToolDescriptor::from_schema(
            "add",
            Some("Add two numbers"),
            &schema(json!({"properties": {"a": {"type": "integer", "format": "int64"}, "b": {"type": "integer"}}})),
        );
        assert_eq!(announced, built);
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDescriptor::new("add", "Add")).unwrap();
        registry.register(ToolDescriptor::new("sqrt", "Root")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), ["add", "sqrt"]);
        assert!(registry.get("add").is_some());
        assert!(registry.get("unknown").is_none());

        let err = registry.register(ToolDescriptor::new("add", "Again")).unwrap_err();
        assert!(err.to_string().contains("duplicate tool name"));
        assert_eq!(registry.len(), 2);
    }
}
