use serde_json::json;
use tooldock_core::ToolDockResult;
use tooldock_registry::{tool_fn, Arguments, InputSchema, ParamSpec, ParamType, Registry, ToolDescriptor};

/// Register `get_current_time` and `add_numbers`.
pub fn register(registry: &mut Registry) -> ToolDockResult<()> {
    registry.register(
        ToolDescriptor::new(
            "get_current_time",
            "Current local time of the server as an RFC 3339 timestamp",
            InputSchema::new(),
            tool_fn(|_args: Arguments| async move {
                Ok(json!(chrono::Local::now().to_rfc3339()))
            }),
        )
        .returns(ParamType::String),
    )?;

    registry.register(
        ToolDescriptor::new(
            "add_numbers",
            "Add two numbers",
            InputSchema::new()
                .param(ParamSpec::required("a", ParamType::Number).describe("First addend"))
                .param(ParamSpec::required("b", ParamType::Number).describe("Second addend")),
            tool_fn(|args: Arguments| async move {
                let a = args.f64("a").unwrap_or_default();
                let b = args.f64("b").unwrap_or_default();
                Ok(json!(a + b))
            }),
        )
        .returns(ParamType::Number),
    )?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn args(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_add_numbers_coerces_strings() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();

        let tool = registry.resolve_tool("add_numbers").unwrap();
        let bound = tool.input_schema.bind(&args(json!({"a": "2", "b": 3.5}))).unwrap();
        let sum = tool.handler.call(bound).await.unwrap();
        assert_eq!(sum, json!(5.5));
    }

    #[tokio::test]
    async fn test_current_time_parses() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();

        let tool = registry.resolve_tool("get_current_time").unwrap();
        let value = tool.handler.call(Arguments::default()).await.unwrap();
        let stamp = value.as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }
}
