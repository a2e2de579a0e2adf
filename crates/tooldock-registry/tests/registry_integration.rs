#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for registration, resolution and argument binding.

use serde_json::json;
use tooldock_core::ToolDockError;
use tooldock_registry::{
    resource_fn, tool_fn, Arguments, HandlerError, InputSchema, ParamSpec, ParamType, Registry,
    ResourceContent, ResourceDescriptor, SchemaViolation, ToolDescriptor, UriParams,
};

fn add_numbers() -> ToolDescriptor {
    ToolDescriptor::new(
        "add_numbers",
        "Add two numbers",
        InputSchema::new()
            .param(ParamSpec::required("a", ParamType::Number))
            .param(ParamSpec::required("b", ParamType::Number)),
        tool_fn(|args: Arguments| async move {
            let a = args.f64("a").unwrap_or_default();
            let b = args.f64("b").unwrap_or_default();
            Ok(json!(a + b))
        }),
    )
    .returns(ParamType::Number)
}

fn document_resource() -> ResourceDescriptor {
    ResourceDescriptor::new(
        "docs://documents/{name}",
        "document",
        "A single document",
        resource_fn(|params: UriParams| async move {
            match params.get("name").map(String::as_str) {
                Some("missing.txt") => Err(HandlerError::not_found("no such document")),
                Some(name) => Ok(ResourceContent::from(format!("contents of {name}"))),
                None => Err(HandlerError::tool("name required")),
            }
        }),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Tool registration and invocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_resolved_tool_runs_with_bound_arguments() {
    let mut registry = Registry::new();
    registry.register(add_numbers()).unwrap();

    let tool = registry.resolve_tool("add_numbers").unwrap();
    let args = tool
        .input_schema
        .bind(json!({"a": 2, "b": "3.5"}).as_object().unwrap())
        .unwrap();
    let result = tool.handler.call(args).await.unwrap();
    assert_eq!(result, json!(5.5));
    assert_eq!(tool.output, Some(ParamType::Number));
}

#[test]
fn test_missing_argument_is_reported_by_name() {
    let mut registry = Registry::new();
    registry.register(add_numbers()).unwrap();

    let tool = registry.resolve_tool("add_numbers").unwrap();
    let err = tool
        .input_schema
        .bind(json!({"a": 1}).as_object().unwrap())
        .unwrap_err();
    assert_eq!(err, SchemaViolation::Missing("b".into()));
    assert!(err.to_string().contains("'b'"));
}

#[test]
fn test_wrong_type_is_reported() {
    let schema = InputSchema::new().param(ParamSpec::required("a", ParamType::Number));
    let err = schema
        .bind(json!({"a": "not-a-number"}).as_object().unwrap())
        .unwrap_err();
    assert!(matches!(err, SchemaViolation::WrongType { ref param, .. } if param == "a"));
}

#[test]
fn test_listing_exposes_json_schema() {
    let mut registry = Registry::new();
    registry.register(add_numbers()).unwrap();

    let tools = registry.list_tools();
    assert_eq!(tools.len(), 1);
    let schema = &tools[0].input_schema;
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["a"]["type"], "number");
    assert_eq!(schema["required"], json!(["a", "b"]));
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_templated_resource_receives_placeholder() {
    let mut registry = Registry::new();
    registry.register(document_resource()).unwrap();

    let hit = registry.resolve_resource("docs://documents/foo.txt").unwrap();
    let content = hit.descriptor.handler.read(hit.params).await.unwrap();
    assert_eq!(content, ResourceContent::Text("contents of foo.txt".into()));
}

#[tokio::test]
async fn test_resource_handler_not_found() {
    let mut registry = Registry::new();
    registry.register(document_resource()).unwrap();

    let hit = registry
        .resolve_resource("docs://documents/missing.txt")
        .unwrap();
    let err = hit.descriptor.handler.read(hit.params).await.unwrap_err();
    assert!(matches!(err, HandlerError::NotFound(_)));
}

#[test]
fn test_placeholder_does_not_span_segments() {
    let mut registry = Registry::new();
    registry.register(document_resource()).unwrap();
    assert!(matches!(
        registry.resolve_resource("docs://documents/a/b"),
        Err(ToolDockError::NotFound(_))
    ));
}

#[test]
fn test_invalid_pattern_rejected() {
    let result = ResourceDescriptor::new(
        "docs://{unclosed",
        "broken",
        "",
        resource_fn(|_params: UriParams| async move { Ok(ResourceContent::from("")) }),
    );
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

#[test]
fn test_counts_track_registrations() {
    let mut registry = Registry::new();
    assert_eq!(registry.tool_count(), 0);
    registry.register(add_numbers()).unwrap();
    registry.register(document_resource()).unwrap();
    assert!(registry.register(add_numbers()).is_err());
    assert_eq!(registry.tool_count(), 1);
    assert_eq!(registry.resource_count(), 1);
    assert_eq!(registry.prompt_count(), 0);
}
