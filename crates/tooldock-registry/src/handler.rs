//! Handler traits invoked by the dispatcher, plus closure adapters.

use crate::schema::Arguments;
use crate::uri::UriParams;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// How a handler reports failure.
///
/// `Tool` and `NotFound` messages are chosen by the handler and are shown
/// to the caller as-is. `Internal` errors are logged server-side and replaced
/// by a generic message before leaving the process.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A known domain failure. The message is safe to show the LLM.
    #[error("{0}")]
    Tool(String),

    /// The handler looked for something (a document, a row) that is absent.
    #[error("{0}")]
    NotFound(String),

    /// Anything else.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// A failure reported to the caller as a `ToolError`.
    pub fn tool(message: impl Into<String>) -> Self {
        HandlerError::Tool(message.into())
    }

    /// A missing entity, reported as `NotFoundError`.
    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerError::NotFound(message.into())
    }

    /// An unexpected failure. Logged, never sent to the caller.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        HandlerError::Internal(error.into())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError::internal(e)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::internal(e)
    }
}

/// Content returned by a resource handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceContent {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, sent base64 encoded.
    Binary(Vec<u8>),
}

impl ResourceContent {
    /// The response payload: a bare string for text, a base64 blob object
    /// for binary content.
    pub fn into_payload(self, mime_type: &str) -> Value {
        match self {
            ResourceContent::Text(text) => Value::String(text),
            ResourceContent::Binary(bytes) => serde_json::json!({
                "mime_type": mime_type,
                "blob": base64::engine::general_purpose::STANDARD.encode(bytes),
            }),
        }
    }
}

impl From<String> for ResourceContent {
    fn from(text: String) -> Self {
        ResourceContent::Text(text)
    }
}

impl From<&str> for ResourceContent {
    fn from(text: &str) -> Self {
        ResourceContent::Text(text.to_string())
    }
}

impl From<Vec<u8>> for ResourceContent {
    fn from(bytes: Vec<u8>) -> Self {
        ResourceContent::Binary(bytes)
    }
}

/// Executes a tool once its arguments have been validated and bound.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError>;
}

/// Produces the content behind a resource URI.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// `params` holds the placeholder values; empty for literal URIs.
    async fn read(&self, params: UriParams) -> Result<ResourceContent, HandlerError>;
}

/// Renders a prompt template.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn render(&self, args: Arguments) -> Result<String, HandlerError>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError> {
        (self.0)(args).await
    }
}

/// Adapter turning an async closure into a [`ResourceHandler`].
pub struct FnResource<F>(F);

#[async_trait]
impl<F, Fut> ResourceHandler for FnResource<F>
where
    F: Fn(UriParams) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResourceContent, HandlerError>> + Send,
{
    async fn read(&self, params: UriParams) -> Result<ResourceContent, HandlerError> {
        (self.0)(params).await
    }
}

/// Adapter turning an async closure into a [`PromptHandler`].
pub struct FnPrompt<F>(F);

#[async_trait]
impl<F, Fut> PromptHandler for FnPrompt<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, HandlerError>> + Send,
{
    async fn render(&self, args: Arguments) -> Result<String, HandlerError> {
        (self.0)(args).await
    }
}

/// Wrap an async closure as a shared tool handler.
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnTool(f))
}

/// Wrap an async closure as a shared resource handler.
pub fn resource_fn<F, Fut>(f: F) -> Arc<dyn ResourceHandler>
where
    F: Fn(UriParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResourceContent, HandlerError>> + Send + 'static,
{
    Arc::new(FnResource(f))
}

/// Wrap an async closure as a shared prompt handler.
pub fn prompt_fn<F, Fut>(f: F) -> Arc<dyn PromptHandler>
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, HandlerError>> + Send + 'static,
{
    Arc::new(FnPrompt(f))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{InputSchema, ParamSpec, ParamType};
    use serde_json::json;

    #[tokio::test]
    async fn test_tool_fn_adapter() {
        let handler = tool_fn(|args: Arguments| async move {
            let a = args.i64("a").unwrap_or_default();
            Ok(json!(a * 2))
        });
        let schema = InputSchema::new().param(ParamSpec::required("a", ParamType::Integer));
        let args = schema
            .bind(json!({"a": 21}).as_object().unwrap())
            .unwrap();
        assert_eq!(handler.call(args).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_resource_fn_adapter() {
        let handler = resource_fn(|params: UriParams| async move {
            Ok(ResourceContent::from(format!("doc {}", params["name"])))
        });
        let mut params = UriParams::new();
        params.insert("name".into(), "a.txt".into());
        assert_eq!(
            handler.read(params).await.unwrap(),
            ResourceContent::Text("doc a.txt".into())
        );
    }

    #[test]
    fn test_binary_payload_is_base64() {
        let payload = ResourceContent::from(vec![0u8, 1, 2]).into_payload("application/octet-stream");
        assert_eq!(payload["blob"], "AAEC");
        assert_eq!(payload["mime_type"], "application/octet-stream");
        assert_eq!(ResourceContent::from("hi").into_payload("text/plain"), json!("hi"));
    }

    #[test]
    fn test_io_error_is_internal() {
        let err: HandlerError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/etc/shadow").into();
        assert!(matches!(err, HandlerError::Internal(_)));
    }
}
