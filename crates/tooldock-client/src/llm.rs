//! Mapping between discovered tools and the function-calling shapes of the
//! OpenAI and Anthropic chat APIs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tooldock_core::{ToolCall, ToolResult};
use tooldock_registry::ToolInfo;

/// Which API's tool format to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmFormat {
    /// OpenAI chat completions.
    OpenAi,
    /// Anthropic messages.
    Anthropic,
}

impl LlmFormat {
    /// Tool definitions in this API's shape.
    pub fn tools(&self, tools: &[ToolInfo]) -> Vec<Value> {
        match self {
            LlmFormat::OpenAi => openai_tools(tools),
            LlmFormat::Anthropic => anthropic_tools(tools),
        }
    }

    /// A tool result message in this API's shape.
    pub fn tool_result(&self, result: &ToolResult) -> Value {
        match self {
            LlmFormat::OpenAi => openai_tool_message(result),
            LlmFormat::Anthropic => anthropic_tool_result(result),
        }
    }

    /// The tool calls requested in a chat reply of this API, in order.
    /// A reply that requests none yields an empty list.
    pub fn tool_calls(&self, reply: &Value) -> Vec<ToolCall> {
        match self {
            LlmFormat::OpenAi => parse_openai_tool_calls(reply),
            LlmFormat::Anthropic => parse_anthropic_tool_uses(reply),
        }
    }
}

/// `{"type": "function", "function": {name, description, parameters}}`
pub fn openai_tools(tools: &[ToolInfo]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

/// `{name, description, input_schema}`
pub fn anthropic_tools(tools: &[ToolInfo]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            })
        })
        .collect()
}

/// A `tool` role message answering one OpenAI tool call.
pub fn openai_tool_message(result: &ToolResult) -> Value {
    json!({
        "role": "tool",
        "tool_call_id": result.call_id,
        "content": result.content,
    })
}

/// A `tool_result` content block answering one Anthropic `tool_use` block.
pub fn anthropic_tool_result(result: &ToolResult) -> Value {
    json!({
        "type": "tool_result",
        "tool_use_id": result.call_id,
        "content": result.content,
        "is_error": result.is_error(),
    })
}

/// Extract tool calls from an OpenAI chat completion body.
///
/// Arguments arrive as a JSON-encoded string; an undecodable string
/// becomes an empty object so the call still reaches validation.
fn parse_openai_tool_calls(body: &Value) -> Vec<ToolCall> {
    let Some(calls) = body["choices"][0]["message"]["tool_calls"].as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|tc| {
            let id = tc["id"].as_str()?.to_string();
            let name = tc["function"]["name"].as_str()?.to_string();
            let arguments = tc["function"]["arguments"]
                .as_str()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_else(|| json!({}));
            Some(ToolCall::new(id, name, arguments))
        })
        .collect()
}

/// Extract `tool_use` blocks from an Anthropic messages response body.
fn parse_anthropic_tool_uses(body: &Value) -> Vec<ToolCall> {
    let Some(blocks) = body["content"].as_array() else {
        return Vec::new();
    };
    blocks
        .iter()
        .filter(|b| b["type"] == "tool_use")
        .filter_map(|b| {
            Some(ToolCall {
                id: b["id"].as_str()?.to_string(),
                name: b["name"].as_str()?.to_string(),
                arguments: b.get("input").cloned().unwrap_or_else(|| json!({})),
            })
        })
        .collect()
}
