use crate::error::{ErrorKind, ErrorPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation chosen by the LLM, as the client proxy receives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the LLM API for this call.
    pub id: String,
    /// Possibly server-qualified tool name (`server.tool`).
    pub name: String,
    /// Arguments chosen by the LLM. Anything but an object is rejected when
    /// the call is relayed.
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    /// A call with the given id, name and arguments.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one [`ToolCall`], ready to be handed back to the LLM.
///
/// A failed call is still a well formed result: `error` holds the wire
/// error kind and `content` reads `"<Kind>: <message>"`, so the LLM can
/// react to it in text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the [`ToolCall`] this answers.
    pub call_id: String,
    /// Result text, or the rendered error.
    pub content: String,
    /// Error kind when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ToolResult {
    /// A successful call.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            error: None,
        }
    }

    /// A failed call described by `payload`.
    pub fn failure(call_id: impl Into<String>, payload: &ErrorPayload) -> Self {
        Self {
            call_id: call_id.into(),
            content: payload.to_string(),
            error: Some(payload.kind),
        }
    }

    /// Whether the call failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("call_1", "output");
        assert!(!result.is_error());
        assert_eq!(result.content, "output");
    }

    #[test]
    fn test_tool_result_failure_keeps_kind() {
        let result = ToolResult::failure("call_1", &ErrorPayload::tool("disk full"));
        assert!(result.is_error());
        assert_eq!(result.error, Some(ErrorKind::Tool));
        assert_eq!(result.content, "ToolError: disk full");
    }

    #[test]
    fn test_tool_call_without_arguments() {
        let call: ToolCall = serde_json::from_str(r#"{"id":"c1","name":"now"}"#).unwrap();
        assert_eq!(call, ToolCall::new("c1", "now", Value::Null));
    }
}
