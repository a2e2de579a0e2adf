#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Map, Value};
use tooldock_core::*;

// ---------------------------------------------------------------------------
// 1. Wire examples decode to the expected requests
// ---------------------------------------------------------------------------

#[test]
fn wire_examples_decode() {
    let call = decode_request(
        r#"{"id":"a1","kind":"call_tool","target":"add","arguments":{"a":2,"b":3}}"#,
    )
    .unwrap();
    assert_eq!(call.id, "a1");
    assert_eq!(call.kind, RequestKind::CallTool);
    assert_eq!(call.target.as_deref(), Some("add"));
    assert_eq!(call.arguments.get("a"), Some(&json!(2)));

    let list = decode_request(r#"{"id":"a2","kind":"list_tools"}"#).unwrap();
    assert_eq!(list.kind, RequestKind::ListTools);
    assert!(list.target.is_none());
    assert!(list.arguments.is_empty());

    let read =
        decode_request(r#"{"id":"a3","kind":"read_resource","target":"docs://documents/a.txt"}"#)
            .unwrap();
    assert_eq!(read.kind, RequestKind::ReadResource);
    assert_eq!(read.target.as_deref(), Some("docs://documents/a.txt"));
}

// ---------------------------------------------------------------------------
// 2. Every error kind keeps its wire spelling through a response
// ---------------------------------------------------------------------------

#[test]
fn error_kinds_survive_the_wire() {
    let kinds = [
        ErrorKind::NotFound,
        ErrorKind::Validation,
        ErrorKind::Tool,
        ErrorKind::Internal,
        ErrorKind::Transport,
        ErrorKind::Timeout,
    ];
    for kind in kinds {
        let line = Response::error("e", ErrorPayload::new(kind, "msg"))
            .to_line()
            .unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["payload"]["kind"], kind.as_str());

        let back: Response = serde_json::from_str(&line).unwrap();
        assert_eq!(back.error_payload().unwrap().kind, kind);
    }
}

// ---------------------------------------------------------------------------
// 3. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let dup = ToolDockError::DuplicateName("get_weather".to_string());
    assert_eq!(dup.to_string(), "Duplicate name: get_weather");

    let transport = ToolDockError::Transport("connection refused".to_string());
    assert_eq!(transport.to_string(), "Transport error: connection refused");
    assert!(transport.is_channel_failure());

    let remote = ToolDockError::Remote(ErrorPayload::tool("disk full"));
    assert_eq!(remote.to_string(), "Remote error: ToolError: disk full");
    assert!(!remote.is_channel_failure());

    let serde_err = serde_json::from_str::<Value>("not json").unwrap_err();
    let err: ToolDockError = serde_err.into();
    assert!(err.to_string().starts_with("JSON error:"));

    let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: ToolDockError = io_err.into();
    assert!(err.to_string().starts_with("IO error:"));
}

// ---------------------------------------------------------------------------
// 4. Request builders and responses correlate by id
// ---------------------------------------------------------------------------

#[test]
fn request_response_correlation() {
    let mut args = Map::new();
    args.insert("name".into(), json!("notes.txt"));
    let req = Request::get_prompt("p-9", "summarize", args);
    let decoded = decode_request(&req.to_line().unwrap()).unwrap();
    assert_eq!(decoded, req);

    let resp = Response::success(decoded.id.clone(), json!("rendered"));
    assert_eq!(resp.id, "p-9");
    assert!(resp.is_success());
    assert!(resp.error_payload().is_none());
}

// ---------------------------------------------------------------------------
// 5. ToolResult keeps the error kind of a failed call
// ---------------------------------------------------------------------------

#[test]
fn tool_result_success_and_failure() {
    let success = ToolResult::success("id_1", "all good");
    assert!(!success.is_error());
    assert_eq!(success.call_id, "id_1");
    assert!(!serde_json::to_string(&success).unwrap().contains("error"));

    let failure = ToolResult::failure("id_2", &ErrorPayload::tool("something broke"));
    assert!(failure.is_error());

    let json = serde_json::to_value(&failure).unwrap();
    assert_eq!(json["error"], "ToolError");
    let deser: ToolResult = serde_json::from_value(json).unwrap();
    assert_eq!(deser.error, Some(ErrorKind::Tool));
    assert_eq!(deser.content, "ToolError: something broke");
}
