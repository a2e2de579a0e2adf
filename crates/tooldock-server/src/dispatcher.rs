use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;
use tooldock_core::{decode_request, ErrorPayload, Request, RequestKind, Response};
use tooldock_registry::{json_type_name, HandlerError, Registry};
use tracing::{debug, error, warn};

/// Turns one decoded request into one response.
///
/// Holds no per-request state. Every handler invocation runs on its own
/// task, so a handler that panics is contained and reported as an
/// internal error.
pub struct Dispatcher {
    registry: Arc<Registry>,
    name: String,
    version: String,
}

impl Dispatcher {
    /// A dispatcher serving `registry`, announced as `name`.
    pub fn new(registry: Arc<Registry>, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The registry being served.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Name reported by `initialize`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode a raw frame and dispatch it. A frame that cannot be decoded
    /// still yields a response, carrying whatever id could be recovered.
    pub async fn handle_frame(&self, frame: &str) -> Response {
        match decode_request(frame) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                warn!(id = %e.id, error = %e.payload, "Rejected malformed frame");
                e.into_response()
            }
        }
    }

    /// [`handle_frame`](Self::handle_frame) for a frame read as raw bytes.
    /// Bytes that are not UTF-8 are rejected like any other malformed frame.
    pub async fn handle_bytes(&self, frame: &[u8]) -> Response {
        match std::str::from_utf8(frame) {
            Ok(text) => self.handle_frame(text).await,
            Err(e) => {
                warn!(error = %e, "Rejected frame that is not UTF-8");
                Response::error(
                    "",
                    ErrorPayload::validation(format!("frame is not valid UTF-8: {e}")),
                )
            }
        }
    }

    /// Run one decoded request through validation, invocation and response.
    pub async fn dispatch(&self, request: Request) -> Response {
        let Request {
            id,
            kind,
            target,
            arguments,
        } = request;
        let target = target.unwrap_or_default();
        debug!(id = %id, kind = kind.as_str(), subject = %target, "Dispatching");

        let outcome = match kind {
            RequestKind::Initialize => Ok(self.server_info()),
            RequestKind::ListTools => to_payload(&self.registry.list_tools()),
            RequestKind::ListResources => to_payload(&self.registry.list_resources()),
            RequestKind::ListPrompts => to_payload(&self.registry.list_prompts()),
            RequestKind::CallTool => self.call_tool(&id, &target, arguments).await,
            RequestKind::ReadResource => self.read_resource(&id, &target).await,
            RequestKind::GetPrompt => self.get_prompt(&id, &target, arguments).await,
        };

        debug!(id = %id, state = "responding", ok = outcome.is_ok());
        match outcome {
            Ok(value) => Response::success(id, value),
            Err(payload) => Response::error(id, payload),
        }
    }

    fn server_info(&self) -> Value {
        json!({
            "name": self.name,
            "version": self.version,
            "capabilities": {
                "tools": self.registry.tool_count() > 0,
                "resources": self.registry.resource_count() > 0,
                "prompts": self.registry.prompt_count() > 0,
            },
        })
    }

    async fn call_tool(
        &self,
        id: &str,
        name: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<Value, ErrorPayload> {
        debug!(id = %id, state = "validating", tool = %name);
        let tool = self
            .registry
            .resolve_tool(name)
            .map_err(|e| ErrorPayload::not_found(e.to_string()))?;
        let args = tool
            .input_schema
            .bind(&arguments)
            .map_err(|v| ErrorPayload::validation(format!("tool '{name}': {v}")))?;

        debug!(id = %id, state = "invoking", tool = %name);
        let handler = tool.handler.clone();
        let value = invoke(name, async move { handler.call(args).await }).await?;

        if let Some(expected) = tool.output {
            if !expected.matches(&value) {
                let found = json_type_name(&value);
                warn!(tool = %name, %expected, found, "Tool result does not match declared type");
                return Err(ErrorPayload::validation(format!(
                    "tool '{name}' declared a {expected} result but returned {found}"
                )));
            }
        }
        Ok(value)
    }

    async fn read_resource(&self, id: &str, uri: &str) -> Result<Value, ErrorPayload> {
        debug!(id = %id, state = "validating", uri = %uri);
        let found = self
            .registry
            .resolve_resource(uri)
            .map_err(|e| ErrorPayload::not_found(e.to_string()))?;
        let descriptor = found.descriptor;
        let params = found.params;

        debug!(id = %id, state = "invoking", uri = %uri);
        let handler = descriptor.handler.clone();
        let content = invoke(uri, async move { handler.read(params).await }).await?;
        Ok(content.into_payload(&descriptor.mime_type))
    }

    async fn get_prompt(
        &self,
        id: &str,
        name: &str,
        arguments: serde_json::Map<String, Value>,
    ) -> Result<Value, ErrorPayload> {
        debug!(id = %id, state = "validating", prompt = %name);
        let prompt = self
            .registry
            .resolve_prompt(name)
            .map_err(|e| ErrorPayload::not_found(e.to_string()))?;
        let args = prompt
            .arguments
            .bind(&arguments)
            .map_err(|v| ErrorPayload::validation(format!("prompt '{name}': {v}")))?;

        debug!(id = %id, state = "invoking", prompt = %name);
        let handler = prompt.handler.clone();
        let text = invoke(name, async move { handler.render(args).await }).await?;
        Ok(Value::String(text))
    }
}

/// Run a handler future on its own task and classify how it ended.
async fn invoke<T, F>(target: &str, fut: F) -> Result<T, ErrorPayload>
where
    T: Send + 'static,
    F: Future<Output = Result<T, HandlerError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify(target, e)),
        Err(e) => Err(classify_join(target, e)),
    }
}

fn classify(target: &str, error: HandlerError) -> ErrorPayload {
    match error {
        HandlerError::Tool(message) => {
            debug!(subject = %target, %message, "Handler reported a tool error");
            ErrorPayload::tool(message)
        }
        HandlerError::NotFound(message) => ErrorPayload::not_found(message),
        HandlerError::Internal(e) => {
            error!(subject = %target, error = %e, "Handler failed");
            ErrorPayload::internal()
        }
    }
}

fn classify_join(target: &str, error: JoinError) -> ErrorPayload {
    if error.is_panic() {
        error!(subject = %target, "Handler panicked");
    } else {
        error!(subject = %target, error = %error, "Handler task cancelled");
    }
    ErrorPayload::internal()
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value, ErrorPayload> {
    serde_json::to_value(value).map_err(|e| {
        error!(error = %e, "Failed to encode listing");
        ErrorPayload::internal()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tooldock_core::{ErrorKind, INTERNAL_ERROR_MESSAGE};
    use tooldock_registry::{
        tool_fn, Arguments, InputSchema, ParamSpec, ParamType, ToolDescriptor,
    };

    fn dispatcher_with(tool: ToolDescriptor) -> Dispatcher {
        let mut registry = Registry::new();
        registry.register(tool).unwrap();
        Dispatcher::new(Arc::new(registry), "test")
    }

    #[tokio::test]
    async fn test_initialize_reports_capabilities() {
        let dispatcher = Dispatcher::new(Arc::new(Registry::new()), "empty");
        let resp = dispatcher.dispatch(Request::initialize("1")).await;
        assert!(resp.is_success());
        assert_eq!(resp.payload["name"], "empty");
        assert_eq!(resp.payload["capabilities"]["tools"], false);
    }

    #[tokio::test]
    async fn test_declared_output_type_is_enforced() {
        let tool = ToolDescriptor::new(
            "list_as_string",
            "Returns a list despite declaring a string",
            InputSchema::new(),
            tool_fn(|_args: Arguments| async move { Ok(json!(["a", "b"])) }),
        )
        .returns(ParamType::String);
        let dispatcher = dispatcher_with(tool);

        let resp = dispatcher
            .dispatch(Request::call_tool("1", "list_as_string", Default::default()))
            .await;
        let err = resp.error_payload().unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("array"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let tool = ToolDescriptor::new(
            "explode",
            "Panics",
            InputSchema::new().param(ParamSpec::optional("x", ParamType::Any)),
            tool_fn(|_args: Arguments| async move {
                if true {
                    panic!("secret detail at /home/user/.ssh/id_rsa");
                }
                Ok(Value::Null)
            }),
        );
        let dispatcher = dispatcher_with(tool);

        let resp = dispatcher
            .dispatch(Request::call_tool("7", "explode", Default::default()))
            .await;
        assert_eq!(resp.id, "7");
        let err = resp.error_payload().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.message, INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_frame_echoes_id() {
        let dispatcher = Dispatcher::new(Arc::new(Registry::new()), "test");
        let resp = dispatcher
            .handle_frame(r#"{"id":"9","kind":"teleport"}"#)
            .await;
        assert_eq!(resp.id, "9");
        assert_eq!(resp.error_payload().unwrap().kind, ErrorKind::Validation);

        let resp = dispatcher.handle_frame("not json").await;
        assert_eq!(resp.id, "");
        assert_eq!(resp.error_payload().unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_non_utf8_frame_is_a_validation_error() {
        let dispatcher = Dispatcher::new(Arc::new(Registry::new()), "test");
        let resp = dispatcher.handle_bytes(b"\xff\xfe").await;
        assert_eq!(resp.id, "");
        let err = resp.error_payload().unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("UTF-8"));

        let resp = dispatcher
            .handle_bytes(br#"{"id":"2","kind":"list_tools"}"#)
            .await;
        assert_eq!(resp.id, "2");
        assert!(resp.is_success());
    }
}
