#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the client proxy against in-process servers.
//!
//! Covers: discovery, namespacing and routing, error results, timeouts and
//! teardown, resource and prompt routing, call metrics.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::duplex;
use tooldock_client::{ClientConfig, ClientProxy, LlmFormat, StdioTransport, Transport};
use tooldock_core::{ErrorKind, ToolCall, ToolDockError};
use tooldock_registry::{
    prompt_fn, resource_fn, tool_fn, Arguments, InputSchema, ParamSpec, ParamType,
    PromptDescriptor, Registry, ResourceContent, ResourceDescriptor, ToolDescriptor, UriParams,
};
use tooldock_server::{serve_stdio, Dispatcher, ServeMode};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serve `registry` over an in-memory pipe and return the client end.
fn in_process(name: &str, registry: Registry) -> Arc<dyn Transport> {
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), name));
    let (client_end, server_end) = duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_end);
    tokio::spawn(serve_stdio(
        dispatcher,
        server_read,
        server_write,
        ServeMode::Concurrent,
        16,
    ));
    let (client_read, client_write) = tokio::io::split(client_end);
    Arc::new(StdioTransport::from_pipes(name, client_read, client_write))
}

/// A registry whose `get_weather` answers with `source`.
fn weather_registry(source: &'static str) -> Registry {
    let mut registry = Registry::new();
    registry
        .register(ToolDescriptor::new(
            "get_weather",
            "Weather for a city",
            InputSchema::new().param(ParamSpec::required("city", ParamType::String)),
            tool_fn(move |args: Arguments| async move {
                Ok(json!(format!("{source}: sunny in {}", args.str("city").unwrap_or_default())))
            }),
        ))
        .unwrap();
    registry
        .register(PromptDescriptor::new(
            "briefing",
            "Daily briefing",
            InputSchema::new(),
            prompt_fn(move |_args: Arguments| async move { Ok(format!("{source} briefing")) }),
        ))
        .unwrap();
    registry
}

fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

async fn two_server_proxy() -> ClientProxy {
    let proxy = ClientProxy::new(ClientConfig::default());
    proxy
        .attach("weather", in_process("weather", weather_registry("weather")))
        .await
        .unwrap();
    proxy
        .attach("news", in_process("news", weather_registry("news")))
        .await
        .unwrap();
    proxy
}

// ---------------------------------------------------------------------------
// Namespacing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_conflicting_tools_are_disambiguated() {
    let proxy = two_server_proxy().await;

    let mut names: Vec<String> = proxy.tools().await.into_iter().map(|t| t.name).collect();
    names.sort();
    assert_eq!(names, vec!["news.get_weather", "weather.get_weather"]);

    let from_weather = proxy
        .invoke(call("1", "weather.get_weather", json!({"city": "Lima"})))
        .await;
    assert!(!from_weather.is_error());
    assert_eq!(from_weather.content, "weather: sunny in Lima");

    let from_news = proxy
        .invoke(call("2", "news.get_weather", json!({"city": "Lima"})))
        .await;
    assert_eq!(from_news.content, "news: sunny in Lima");
}

#[tokio::test]
async fn test_unqualified_name_rejected_with_several_servers() {
    let proxy = two_server_proxy().await;
    let result = proxy
        .invoke(call("1", "get_weather", json!({"city": "Lima"})))
        .await;
    assert_eq!(result.error, Some(ErrorKind::NotFound));
    assert!(result.content.starts_with("NotFoundError"));

    let err = proxy
        .call_tool("sports.get_weather", Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ToolDockError::NotFound(_)));
}

#[tokio::test]
async fn test_single_server_names_are_bare() {
    let proxy = ClientProxy::new(ClientConfig::default());
    proxy
        .attach("weather", in_process("weather", weather_registry("weather")))
        .await
        .unwrap();

    let tools = proxy.tools().await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "get_weather");

    let bare = proxy
        .invoke(call("1", "get_weather", json!({"city": "Oslo"})))
        .await;
    let qualified = proxy
        .invoke(call("2", "weather.get_weather", json!({"city": "Oslo"})))
        .await;
    assert_eq!(bare.content, qualified.content);
}

#[tokio::test]
async fn test_duplicate_server_name_rejected() {
    let proxy = ClientProxy::new(ClientConfig::default());
    proxy
        .attach("weather", in_process("weather", weather_registry("a")))
        .await
        .unwrap();
    let err = proxy
        .attach("weather", in_process("weather", weather_registry("b")))
        .await
        .unwrap_err();
    assert!(matches!(err, ToolDockError::Setup { .. }));
}

#[tokio::test]
async fn test_prompts_are_namespaced_and_routed() {
    let proxy = two_server_proxy().await;
    let mut names: Vec<String> = proxy.prompts().await.into_iter().map(|p| p.name).collect();
    names.sort();
    assert_eq!(names, vec!["news.briefing", "weather.briefing"]);

    let text = proxy.get_prompt("news.briefing", Map::new()).await.unwrap();
    assert_eq!(text, "news briefing");
}

// ---------------------------------------------------------------------------
// Error results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_remote_errors_become_tool_results() {
    let proxy = two_server_proxy().await;

    let missing_arg = proxy
        .invoke(call("1", "weather.get_weather", json!({})))
        .await;
    assert_eq!(missing_arg.error, Some(ErrorKind::Validation));
    assert!(missing_arg.content.starts_with("ValidationError"));
    assert!(missing_arg.content.contains("city"));

    let unknown = proxy.invoke(call("2", "weather.subtract", json!({}))).await;
    assert_eq!(unknown.error, Some(ErrorKind::NotFound));
    assert!(unknown.content.starts_with("NotFoundError"));

    let metrics = proxy.server_metrics("weather").await;
    assert_eq!(metrics.total_calls, 2);
    assert_eq!(metrics.failed_calls, 2);
}

// ---------------------------------------------------------------------------
// LLM replies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_respond_to_anthropic_reply() {
    let proxy = two_server_proxy().await;
    let reply = json!({
        "content": [
            {"type": "text", "text": "Checking both sources."},
            {"type": "tool_use", "id": "tu_1", "name": "weather.get_weather", "input": {"city": "Oslo"}},
            {"type": "tool_use", "id": "tu_2", "name": "news.get_weather", "input": {}}
        ]
    });

    let results = proxy.respond(LlmFormat::Anthropic, &reply).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["type"], "tool_result");
    assert_eq!(results[0]["tool_use_id"], "tu_1");
    assert_eq!(results[0]["content"], "weather: sunny in Oslo");
    assert_eq!(results[0]["is_error"], false);
    assert_eq!(results[1]["tool_use_id"], "tu_2");
    assert_eq!(results[1]["is_error"], true);
    assert!(results[1]["content"].as_str().unwrap().starts_with("ValidationError"));
}

#[tokio::test]
async fn test_respond_to_openai_reply() {
    let proxy = two_server_proxy().await;
    let reply = json!({
        "choices": [{"message": {"role": "assistant", "tool_calls": [
            {"id": "call_1", "type": "function",
             "function": {"name": "news.get_weather", "arguments": "{\"city\": \"Lima\"}"}}
        ]}}]
    });

    let results = proxy.respond(LlmFormat::OpenAi, &reply).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["role"], "tool");
    assert_eq!(results[0]["tool_call_id"], "call_1");
    assert_eq!(results[0]["content"], "news: sunny in Lima");

    let text_only = json!({"choices": [{"message": {"content": "Done."}}]});
    assert!(proxy.respond(LlmFormat::OpenAi, &text_only).await.is_empty());
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

fn docs_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            ResourceDescriptor::new(
                "docs://documents/{name}",
                "document",
                "A document",
                resource_fn(|params: UriParams| async move {
                    Ok(ResourceContent::from(format!("doc {}", params["name"])))
                }),
            )
            .unwrap(),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_resource_read_routed_by_template() {
    let proxy = ClientProxy::new(ClientConfig::default());
    proxy
        .attach("weather", in_process("weather", weather_registry("weather")))
        .await
        .unwrap();
    proxy
        .attach("docs", in_process("docs", docs_registry()))
        .await
        .unwrap();

    let value = proxy
        .read_resource("docs://documents/a.txt")
        .await
        .unwrap();
    assert_eq!(value, json!("doc a.txt"));

    let err = proxy.read_resource("news://today").await.unwrap_err();
    assert!(matches!(err, ToolDockError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_timeout_tears_down_attached_transport() {
    let mut registry = Registry::new();
    registry
        .register(ToolDescriptor::new(
            "hang",
            "Never finishes in time",
            InputSchema::new(),
            tool_fn(|_args: Arguments| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Value::Null)
            }),
        ))
        .unwrap();

    let proxy = ClientProxy::new(ClientConfig {
        timeout_secs: 1,
        ..ClientConfig::default()
    });
    proxy
        .attach("slow", in_process("slow", registry))
        .await
        .unwrap();

    let err = proxy.call_tool("hang", Map::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let status = proxy.status().await;
    assert!(!status[0].connected);

    // Attached transports are not respawned.
    let err = proxy.call_tool("hang", Map::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    let metrics = proxy.server_metrics("slow").await;
    assert_eq!(metrics.timed_out_calls, 1);
    assert_eq!(metrics.failed_calls, 2);
}

#[tokio::test]
async fn test_rediscover_refreshes_catalog() {
    let proxy = two_server_proxy().await;
    proxy.discover().await.unwrap();
    assert_eq!(proxy.tools().await.len(), 2);
    proxy.health_check("news").await.unwrap();
    assert!(proxy.health_check("sports").await.is_err());
}
