//! In-memory document store exposed as tools and resources.

use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tooldock_core::ToolDockResult;
use tooldock_registry::{
    resource_fn, tool_fn, Arguments, HandlerError, InputSchema, ParamSpec, ParamType, Registry,
    ResourceContent, ResourceDescriptor, ToolDescriptor, UriParams,
};
use tracing::debug;

const SNIPPET_CHARS: usize = 100;

/// Named text documents kept for the lifetime of the server.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: RwLock<BTreeMap<String, String>>,
}

impl DocumentStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with a few sample documents.
    pub fn with_samples() -> Self {
        let store = Self::new();
        store.write("notes.txt", "This is a sample note document with some text content.");
        store.write(
            "report.md",
            "# Project Report\n\nThis is a markdown report with project details.",
        );
        store.write("data.json", r#"{"users": 10, "projects": 3, "status": "active"}"#);
        store.write(
            "todo.txt",
            "1. Review documentation\n2. Test the server\n3. Create examples",
        );
        store
    }

    /// The content of document `name`, if stored.
    pub fn read(&self, name: &str) -> Option<String> {
        self.docs.read().get(name).cloned()
    }

    /// Create or replace a document. Returns true if it already existed.
    pub fn write(&self, name: &str, content: &str) -> bool {
        self.docs
            .write()
            .insert(name.to_string(), content.to_string())
            .is_some()
    }

    /// Document names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.docs.read().keys().cloned().collect()
    }

    /// Case-insensitive substring search over document bodies.
    pub fn search(&self, query: &str) -> Vec<(String, String)> {
        let needle = query.to_lowercase();
        self.docs
            .read()
            .iter()
            .filter(|(_, content)| content.to_lowercase().contains(&needle))
            .map(|(name, content)| (name.clone(), snippet(content)))
            .collect()
    }

    fn missing(&self, name: &str) -> HandlerError {
        HandlerError::not_found(format!(
            "document '{name}' not found (available: {})",
            self.names().join(", ")
        ))
    }
}

fn snippet(content: &str) -> String {
    match content.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Register the document tools and the `docs://` resources over `store`.
pub fn register(registry: &mut Registry, store: Arc<DocumentStore>) -> ToolDockResult<()> {
    let name_param = || ParamSpec::required("name", ParamType::String).describe("Document name");

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "read_document",
            "Read the content of a document by name",
            InputSchema::new().param(name_param()),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let name = args.require_str("name")?;
                    store
                        .read(name)
                        .map(Value::String)
                        .ok_or_else(|| store.missing(name))
                }
            }),
        )
        .returns(ParamType::String),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "write_document",
            "Create or replace a document",
            InputSchema::new()
                .param(name_param())
                .param(ParamSpec::required("content", ParamType::String)),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let name = args.require_str("name")?;
                    if name.contains('/') {
                        return Err(HandlerError::tool(format!(
                            "document name '{name}' must not contain '/'"
                        )));
                    }
                    let replaced = store.write(name, args.require_str("content")?);
                    debug!(document = %name, replaced, "Document written");
                    Ok(json!({"name": name, "replaced": replaced}))
                }
            }),
        )
        .returns(ParamType::Object),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "list_documents",
            "List the names of all documents",
            InputSchema::new(),
            tool_fn(move |_args: Arguments| {
                let store = s.clone();
                async move { Ok(json!(store.names())) }
            }),
        )
        .returns(ParamType::Array),
    )?;

    let s = store.clone();
    registry.register(
        ToolDescriptor::new(
            "search_documents",
            "Search for text across all documents",
            InputSchema::new()
                .param(ParamSpec::required("query", ParamType::String).describe("Text to search for")),
            tool_fn(move |args: Arguments| {
                let store = s.clone();
                async move {
                    let hits: Vec<Value> = store
                        .search(args.require_str("query")?)
                        .into_iter()
                        .map(|(name, snippet)| json!({"name": name, "snippet": snippet}))
                        .collect();
                    Ok(Value::Array(hits))
                }
            }),
        )
        .returns(ParamType::Array),
    )?;

    let s = store.clone();
    registry.register(
        ResourceDescriptor::new(
            "docs://documents",
            "document_list",
            "Names of all documents as a JSON array",
            resource_fn(move |_params: UriParams| {
                let store = s.clone();
                async move { Ok(ResourceContent::from(serde_json::to_string(&store.names())?)) }
            }),
        )?
        .with_mime_type("application/json"),
    )?;

    registry.register(ResourceDescriptor::new(
        "docs://documents/{name}",
        "document",
        "The content of one document",
        resource_fn(move |params: UriParams| {
            let store = store.clone();
            async move {
                let name = params.get("name").map(String::as_str).unwrap_or_default();
                store
                    .read(name)
                    .map(ResourceContent::from)
                    .ok_or_else(|| store.missing(name))
            }
        }),
    )?)?;

    Ok(())
}
