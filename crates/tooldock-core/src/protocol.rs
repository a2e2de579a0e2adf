//! Request/response envelopes exchanged between a client and a dispatcher.
//!
//! One envelope is one JSON object. Over stdio every envelope is written on
//! its own line; compact `serde_json` output never contains a raw newline, so
//! newline-delimited framing is sufficient.

use crate::error::{ErrorKind, ErrorPayload, ToolDockResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a [`Request`] asks the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Handshake: server name, version and capabilities.
    Initialize,
    /// List registered tools.
    ListTools,
    /// Invoke a tool by name.
    CallTool,
    /// List registered resources.
    ListResources,
    /// Read a resource by URI.
    ReadResource,
    /// List registered prompts.
    ListPrompts,
    /// Render a prompt by name.
    GetPrompt,
}

impl RequestKind {
    /// Whether this kind names a `target`.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            RequestKind::CallTool | RequestKind::ReadResource | RequestKind::GetPrompt
        )
    }

    /// The wire spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Initialize => "initialize",
            RequestKind::ListTools => "list_tools",
            RequestKind::CallTool => "call_tool",
            RequestKind::ListResources => "list_resources",
            RequestKind::ReadResource => "read_resource",
            RequestKind::ListPrompts => "list_prompts",
            RequestKind::GetPrompt => "get_prompt",
        }
    }
}

/// A single request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed in the matching [`Response`].
    #[serde(default)]
    pub id: String,
    /// What the request asks for.
    pub kind: RequestKind,
    /// Tool name, resource URI or prompt name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Named arguments for `call_tool` and `get_prompt`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
}

impl Request {
    /// A request with no target and no arguments.
    pub fn new(id: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            id: id.into(),
            kind,
            target: None,
            arguments: Map::new(),
        }
    }

    /// An `initialize` request.
    pub fn initialize(id: impl Into<String>) -> Self {
        Self::new(id, RequestKind::Initialize)
    }

    /// A `list_tools` request.
    pub fn list_tools(id: impl Into<String>) -> Self {
        Self::new(id, RequestKind::ListTools)
    }

    /// A `list_resources` request.
    pub fn list_resources(id: impl Into<String>) -> Self {
        Self::new(id, RequestKind::ListResources)
    }

    /// A `list_prompts` request.
    pub fn list_prompts(id: impl Into<String>) -> Self {
        Self::new(id, RequestKind::ListPrompts)
    }

    /// A `call_tool` request for tool `name`.
    pub fn call_tool(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            target: Some(name.into()),
            arguments,
            ..Self::new(id, RequestKind::CallTool)
        }
    }

    /// A `read_resource` request for `uri`.
    pub fn read_resource(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            target: Some(uri.into()),
            ..Self::new(id, RequestKind::ReadResource)
        }
    }

    /// A `get_prompt` request for prompt `name`.
    pub fn get_prompt(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            target: Some(name.into()),
            arguments,
            ..Self::new(id, RequestKind::GetPrompt)
        }
    }

    /// Serialize as a single line (no trailing newline).
    pub fn to_line(&self) -> ToolDockResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A frame that could not be turned into a [`Request`].
///
/// Carries whatever id could be recovered so the error response can still
/// be correlated.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameError {
    /// Recovered request id, or empty.
    pub id: String,
    /// Always a `ValidationError`.
    pub payload: ErrorPayload,
}

impl FrameError {
    /// The error response for this frame.
    pub fn into_response(self) -> Response {
        Response::error(self.id, self.payload)
    }
}

/// Decode one frame into a [`Request`].
///
/// Invalid JSON, an unknown `kind`, a non-object `arguments` value, or a
/// missing `target` on a kind that needs one are all reported as
/// [`ErrorKind::Validation`].
pub fn decode_request(frame: &str) -> Result<Request, FrameError> {
    let value: Value = serde_json::from_str(frame).map_err(|e| FrameError {
        id: String::new(),
        payload: ErrorPayload::validation(format!("malformed JSON frame: {e}")),
    })?;

    let id = match value.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let request: Request = serde_json::from_value(value).map_err(|e| FrameError {
        id: id.clone(),
        payload: ErrorPayload::validation(format!("invalid request: {e}")),
    })?;

    if request.kind.requires_target()
        && request.target.as_deref().map_or(true, str::is_empty)
    {
        return Err(FrameError {
            id,
            payload: ErrorPayload::validation(format!(
                "'{}' requires a target",
                request.kind.as_str()
            )),
        });
    }

    Ok(request)
}

/// Outcome marker of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The request succeeded; `payload` is the result.
    Success,
    /// The request failed; `payload` is an error payload.
    Error,
}

/// A single response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The id of the [`Request`] this answers.
    #[serde(default)]
    pub id: String,
    /// Whether the request succeeded.
    pub status: Status,
    /// The result value on success, an [`ErrorPayload`] object on error.
    #[serde(default)]
    pub payload: Value,
}

impl Response {
    /// A success response carrying `value`.
    pub fn success(id: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            status: Status::Success,
            payload: value,
        }
    }

    /// An error response carrying `error`.
    pub fn error(id: impl Into<String>, error: ErrorPayload) -> Self {
        let payload = serde_json::json!({
            "kind": error.kind,
            "message": error.message,
        });
        Self {
            id: id.into(),
            status: Status::Error,
            payload,
        }
    }

    /// True for a `success` response.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The error payload, if this is an error response.
    ///
    /// A server that sends an error without a well-formed payload gets an
    /// internal error in its place.
    pub fn error_payload(&self) -> Option<ErrorPayload> {
        self.clone().into_result().err()
    }

    /// Split into the success value or the error payload.
    pub fn into_result(self) -> Result<Value, ErrorPayload> {
        match self.status {
            Status::Success => Ok(self.payload),
            Status::Error => Err(serde_json::from_value(self.payload).unwrap_or_else(|_| {
                ErrorPayload::new(ErrorKind::Internal, "malformed error payload")
            })),
        }
    }

    /// Serialize as a single line (no trailing newline).
    pub fn to_line(&self) -> ToolDockResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_tool_wire_shape() {
        let mut args = Map::new();
        args.insert("a".into(), json!(2));
        let req = Request::call_tool("7", "add", args);
        let parsed: Value = serde_json::from_str(&req.to_line().unwrap()).unwrap();
        assert_eq!(parsed["id"], "7");
        assert_eq!(parsed["kind"], "call_tool");
        assert_eq!(parsed["target"], "add");
        assert_eq!(parsed["arguments"]["a"], 2);
    }

    #[test]
    fn test_list_tools_omits_target_and_arguments() {
        let line = Request::list_tools("1").to_line().unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert!(parsed.get("target").is_none());
        assert!(parsed.get("arguments").is_none());
    }

    #[test]
    fn test_decode_without_id() {
        let req = decode_request(r#"{"kind":"call_tool","target":"add","arguments":{"a":2,"b":3}}"#)
            .unwrap();
        assert_eq!(req.id, "");
        assert_eq!(req.kind, RequestKind::CallTool);
        assert_eq!(req.arguments["b"], 3);
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode_request("{not json").unwrap_err();
        assert_eq!(err.id, "");
        assert_eq!(err.payload.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_decode_unknown_kind_keeps_id() {
        let err = decode_request(r#"{"id":"x1","kind":"explode"}"#).unwrap_err();
        assert_eq!(err.id, "x1");
        assert_eq!(err.payload.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_decode_numeric_id_is_recovered() {
        let err = decode_request(r#"{"id":42,"kind":"explode"}"#).unwrap_err();
        assert_eq!(err.id, "42");
    }

    #[test]
    fn test_decode_missing_target() {
        let err = decode_request(r#"{"id":"r","kind":"read_resource"}"#).unwrap_err();
        assert_eq!(err.payload.kind, ErrorKind::Validation);
        assert!(err.payload.message.contains("read_resource"));
    }

    #[test]
    fn test_decode_rejects_non_object_arguments() {
        let err =
            decode_request(r#"{"id":"r","kind":"call_tool","target":"t","arguments":[1]}"#)
                .unwrap_err();
        assert_eq!(err.payload.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_error_response_shape() {
        let resp = Response::error("3", ErrorPayload::not_found("no tool 'subtract'"));
        let parsed: Value = serde_json::from_str(&resp.to_line().unwrap()).unwrap();
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["payload"]["kind"], "NotFoundError");
        assert_eq!(parsed["payload"]["message"], "no tool 'subtract'");
    }

    #[test]
    fn test_into_result() {
        let ok = Response::success("1", json!(5)).into_result().unwrap();
        assert_eq!(ok, json!(5));

        let err = Response::error("2", ErrorPayload::tool("denied"))
            .into_result()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Tool);

        let garbled = Response {
            id: "3".into(),
            status: Status::Error,
            payload: json!("oops"),
        };
        assert_eq!(garbled.into_result().unwrap_err().kind, ErrorKind::Internal);
    }

    #[test]
    fn test_payload_newlines_stay_escaped() {
        let resp = Response::success("1", json!("line one\nline two"));
        let line = resp.to_line().unwrap();
        assert!(!line.contains('\n'));
    }
}
