//! Schema Describer
//!
//! Renders tool descriptors into the numbered menu embedded in the system
//! prompt. Output depends only on the input order, so the same registry
//! always yields byte-identical prompt text.

use crate::registry::ToolDescriptor;

const NO_PARAMETERS: &str = "no parameters";
const NO_DESCRIPTION: &str = "No description available";

/// Render one menu line per descriptor, numbered from 1
pub fn describe_tools(descriptors: &[ToolDescriptor]) -> String {
    descriptors
        .iter()
        .enumerate()
        .map(|(i, descriptor)| describe_tool(i + 1, descriptor))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_tool(ordinal: usize, descriptor: &ToolDescriptor) -> String {
    let params = if descriptor.parameters.is_empty() {
        NO_PARAMETERS.to_string()
    } else {
        descriptor
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.param_type))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let description = descriptor.description.trim();
    let description = if description.is_empty() {
        NO_DESCRIPTION
    } else {
        description
    };

    format!("{}. {}({}) - {}", ordinal, descriptor.name, params, description)
}
